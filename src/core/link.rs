//! Link functions for generalized linear models.
//!
//! Each link g maps the mean μ to the linear predictor η = g(μ). The
//! simulation engine only ever needs the inverse direction, while the IRLS
//! solver needs both directions plus derivatives.

use statrs::function::erf::{erf, erf_inv};
use std::f64::consts::{FRAC_1_SQRT_2, PI, SQRT_2};

/// Link function g(μ) = η.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Link {
    /// g(μ) = μ
    #[default]
    Identity,
    /// g(μ) = log(μ/(1-μ))
    Logit,
    /// g(μ) = Φ⁻¹(μ) where Φ is the standard normal CDF
    Probit,
    /// g(μ) = log(μ)
    Log,
    /// g(μ) = 1/μ
    Inverse,
}

impl Link {
    /// Compute the link function g(μ).
    #[inline]
    pub fn link(&self, mu: f64) -> f64 {
        match self {
            Link::Identity => mu,
            Link::Logit => {
                let mu = clamp_probability(mu);
                (mu / (1.0 - mu)).ln()
            }
            Link::Probit => SQRT_2 * erf_inv(2.0 * clamp_probability(mu) - 1.0),
            Link::Log => mu.max(1e-10).ln(),
            Link::Inverse => 1.0 / mu,
        }
    }

    /// Compute the inverse link function g⁻¹(η) = μ.
    #[inline]
    pub fn link_inverse(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => eta,
            Link::Logit => {
                // Numerically stable for large |η|
                if eta >= 0.0 {
                    1.0 / (1.0 + (-eta).exp())
                } else {
                    let e = eta.exp();
                    e / (1.0 + e)
                }
            }
            Link::Probit => standard_normal_cdf(eta),
            Link::Log => eta.min(700.0).exp(),
            Link::Inverse => 1.0 / eta,
        }
    }

    /// Compute derivative of the inverse link dμ/dη.
    #[inline]
    pub fn mu_eta(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => 1.0,
            Link::Logit => {
                let mu = self.link_inverse(eta);
                (mu * (1.0 - mu)).max(f64::EPSILON)
            }
            Link::Probit => standard_normal_pdf(eta).max(f64::EPSILON),
            Link::Log => eta.min(700.0).exp().max(f64::EPSILON),
            Link::Inverse => -1.0 / (eta * eta),
        }
    }

    /// Name as reported in model summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Link::Identity => "identity",
            Link::Logit => "logit",
            Link::Probit => "probit",
            Link::Log => "log",
            Link::Inverse => "inverse",
        }
    }
}

#[inline]
fn clamp_probability(mu: f64) -> f64 {
    mu.clamp(1e-10, 1.0 - 1e-10)
}

/// Standard normal CDF Φ(x).
#[inline]
pub fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x * FRAC_1_SQRT_2))
}

/// Standard normal PDF φ(x) = exp(-x²/2) / √(2π).
#[inline]
pub fn standard_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cases = [
            (Link::Identity, 2.5),
            (Link::Logit, 0.3),
            (Link::Probit, 0.8),
            (Link::Log, 4.0),
            (Link::Inverse, 0.25),
        ];
        for (link, mu) in cases {
            let eta = link.link(mu);
            assert!(
                (link.link_inverse(eta) - mu).abs() < 1e-9,
                "roundtrip failed for {}",
                link.name()
            );
        }
    }

    #[test]
    fn test_logit_extremes_stay_in_unit_interval() {
        assert!(Link::Logit.link_inverse(800.0) <= 1.0);
        assert!(Link::Logit.link_inverse(-800.0) >= 0.0);
    }

    #[test]
    fn test_probit_matches_normal_cdf() {
        // pnorm(1.96) = 0.9750021
        assert!((Link::Probit.link_inverse(1.96) - 0.975_002_104_851_780).abs() < 1e-7);
    }

    #[test]
    fn test_mu_eta_matches_finite_difference() {
        let h = 1e-6;
        for link in [Link::Logit, Link::Probit, Link::Log, Link::Inverse] {
            let eta = 0.7;
            let numeric = (link.link_inverse(eta + h) - link.link_inverse(eta - h)) / (2.0 * h);
            assert!(
                (link.mu_eta(eta) - numeric).abs() < 1e-5,
                "derivative mismatch for {}",
                link.name()
            );
        }
    }
}
