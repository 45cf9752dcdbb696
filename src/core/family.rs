//! GLM family definitions for generalized linear models.
//!
//! A family pairs a variance function V(μ) with a link function. The IRLS
//! solver is written once against [`GlmFamily`]; the concrete families here
//! cover the distributions the model registry fits with it.

use super::link::Link;

/// Variance and link structure of a generalized linear model.
pub trait GlmFamily {
    /// Variance function V(μ).
    fn variance(&self, mu: f64) -> f64;

    /// Link function used by this family.
    fn link(&self) -> Link;

    /// Unit deviance d(y, μ).
    fn unit_deviance(&self, y: f64, mu: f64) -> f64;

    /// Starting values for μ.
    fn initialize_mu(&self, y: &[f64]) -> Vec<f64>;

    /// Whether the dispersion is fixed at one (binomial, Poisson, negative binomial).
    fn fixed_dispersion(&self) -> bool {
        false
    }

    /// Family name as reported in summaries.
    fn name(&self) -> &'static str;

    /// Whether μ lies in the valid range of the family.
    fn valid_mu(&self, mu: f64) -> bool {
        mu.is_finite()
    }
}

/// Gaussian family with identity link.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaussianFamily;

impl GlmFamily for GaussianFamily {
    fn variance(&self, _mu: f64) -> f64 {
        1.0
    }

    fn link(&self) -> Link {
        Link::Identity
    }

    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        (y - mu).powi(2)
    }

    fn initialize_mu(&self, y: &[f64]) -> Vec<f64> {
        y.to_vec()
    }

    fn name(&self) -> &'static str {
        "gaussian"
    }
}

/// Binomial family for binary outcomes with logit or probit link.
///
/// V(μ) = μ(1 - μ).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinomialFamily {
    /// The link function to use.
    pub link: Link,
}

impl BinomialFamily {
    /// Logistic regression family (canonical logit link).
    pub fn logistic() -> Self {
        Self { link: Link::Logit }
    }

    /// Probit regression family.
    pub fn probit() -> Self {
        Self { link: Link::Probit }
    }
}

impl GlmFamily for BinomialFamily {
    fn variance(&self, mu: f64) -> f64 {
        let mu = mu.clamp(1e-10, 1.0 - 1e-10);
        mu * (1.0 - mu)
    }

    fn link(&self) -> Link {
        self.link
    }

    /// d(y,μ) = 2[y·log(y/μ) + (1-y)·log((1-y)/(1-μ))]
    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        let mu = mu.clamp(1e-10, 1.0 - 1e-10);
        let term1 = if y > 1e-10 { y * (y / mu).ln() } else { 0.0 };
        let term2 = if y < 1.0 - 1e-10 {
            (1.0 - y) * ((1.0 - y) / (1.0 - mu)).ln()
        } else {
            0.0
        };
        (2.0 * (term1 + term2)).max(0.0)
    }

    fn initialize_mu(&self, y: &[f64]) -> Vec<f64> {
        y.iter().map(|&yi| (yi + 0.5) / 2.0).collect()
    }

    fn fixed_dispersion(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "binomial"
    }

    fn valid_mu(&self, mu: f64) -> bool {
        mu.is_finite() && mu > 0.0 && mu < 1.0
    }
}

/// Poisson family with log link. V(μ) = μ.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoissonFamily;

impl GlmFamily for PoissonFamily {
    fn variance(&self, mu: f64) -> f64 {
        mu.max(1e-10)
    }

    fn link(&self) -> Link {
        Link::Log
    }

    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        let mu = mu.max(1e-10);
        if y > 0.0 {
            2.0 * (y * (y / mu).ln() - (y - mu))
        } else {
            2.0 * mu
        }
    }

    fn initialize_mu(&self, y: &[f64]) -> Vec<f64> {
        y.iter().map(|&yi| yi + 0.1).collect()
    }

    fn fixed_dispersion(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "poisson"
    }

    fn valid_mu(&self, mu: f64) -> bool {
        mu.is_finite() && mu > 0.0
    }
}

/// Gamma family with the canonical inverse link. V(μ) = μ².
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GammaFamily;

impl GlmFamily for GammaFamily {
    fn variance(&self, mu: f64) -> f64 {
        mu * mu
    }

    fn link(&self) -> Link {
        Link::Inverse
    }

    /// d(y,μ) = 2[-log(y/μ) + (y - μ)/μ]
    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        2.0 * (-(y / mu).ln() + (y - mu) / mu)
    }

    fn initialize_mu(&self, y: &[f64]) -> Vec<f64> {
        y.to_vec()
    }

    fn name(&self) -> &'static str {
        "Gamma"
    }

    fn valid_mu(&self, mu: f64) -> bool {
        mu.is_finite() && mu > 0.0
    }
}

/// Negative binomial family with log link and known θ.
///
/// V(μ) = μ + μ²/θ. As θ → ∞ this approaches the Poisson variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeBinomialFamily {
    /// Dispersion parameter (R's `size`/`theta`).
    pub theta: f64,
}

impl NegativeBinomialFamily {
    /// Create a negative binomial family with the given θ (must be positive).
    pub fn new(theta: f64) -> Self {
        Self {
            theta: theta.max(1e-8),
        }
    }
}

impl GlmFamily for NegativeBinomialFamily {
    fn variance(&self, mu: f64) -> f64 {
        let mu = mu.max(1e-10);
        mu + mu * mu / self.theta
    }

    fn link(&self) -> Link {
        Link::Log
    }

    /// d(y, μ) = 2[y·log(y/μ) - (y + θ)·log((y + θ)/(μ + θ))]
    fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        let mu = mu.max(1e-10);
        let theta = self.theta;
        let term1 = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
        let term2 = (y + theta) * ((y + theta) / (mu + theta)).ln();
        (2.0 * (term1 - term2)).max(0.0)
    }

    fn initialize_mu(&self, y: &[f64]) -> Vec<f64> {
        y.iter().map(|&yi| yi + 0.1).collect()
    }

    fn fixed_dispersion(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "negative binomial"
    }

    fn valid_mu(&self, mu: f64) -> bool {
        mu.is_finite() && mu > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial_variance() {
        let fam = BinomialFamily::logistic();
        assert!((fam.variance(0.5) - 0.25).abs() < 1e-12);
        assert_eq!(fam.link(), Link::Logit);
        assert!(fam.fixed_dispersion());
    }

    #[test]
    fn test_poisson_deviance() {
        let fam = PoissonFamily;
        let (y, mu) = (3.0_f64, 2.0_f64);
        let expected = 2.0 * (y * (y / mu).ln() - (y - mu));
        assert!((fam.unit_deviance(y, mu) - expected).abs() < 1e-12);
        assert!((fam.unit_deviance(0.0, mu) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_gamma_uses_inverse_link() {
        let fam = GammaFamily;
        assert_eq!(fam.link(), Link::Inverse);
        assert!((fam.variance(3.0) - 9.0).abs() < 1e-12);
        assert!(fam.unit_deviance(2.0, 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_binomial_variance() {
        // V(μ) = μ + μ²/θ; at μ = 4, θ = 2: 4 + 16/2 = 12
        let nb = NegativeBinomialFamily::new(2.0);
        assert!((nb.variance(4.0) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_binomial_deviance_zero_at_fit() {
        let nb = NegativeBinomialFamily::new(1.5);
        assert!(nb.unit_deviance(5.0, 5.0).abs() < 1e-12);
        assert!(nb.unit_deviance(0.0, 2.0) > 0.0);
    }
}
