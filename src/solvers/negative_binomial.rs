//! Negative binomial regression with maximum likelihood θ.
//!
//! Alternates an IRLS fit of the mean model at fixed θ with a Newton solve
//! for θ at fixed μ, starting from a Poisson fit, until both the deviance and
//! θ settle (the `glm.nb` scheme).

use crate::core::{NegativeBinomialFamily, PoissonFamily};
use crate::solvers::glm::{glm_estimating_functions, irls, validate_response};
use crate::solvers::traits::{
    effective_n, validate_inputs, BackendFit, BackendKind, FitControl, RegressionError, Regressor,
};
use faer::Mat;
use statrs::function::gamma::digamma;

/// Name of the θ row/column in the reported covariance.
pub const THETA_NAME: &str = ".theta";

const MAX_OUTER_ITERATIONS: usize = 25;
const THETA_BOUNDS: (f64, f64) = (1e-4, 1e8);

/// Negative binomial regressor with log link.
#[derive(Debug, Clone, Default)]
pub struct NegativeBinomialRegressor {
    control: FitControl,
}

impl NegativeBinomialRegressor {
    /// Create a regressor with the given control settings.
    pub fn new(control: FitControl) -> Self {
        Self { control }
    }
}

impl Regressor for NegativeBinomialRegressor {
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
    ) -> Result<BackendFit, RegressionError> {
        validate_inputs(x, y, weights, names)?;
        validate_response(&PoissonFamily, y)?;

        let mut state = irls(x, y, weights, &PoissonFamily, None, &self.control)?;
        let mut theta = theta_ml(y, &state.mu, weights, &self.control);
        let mut iterations = state.iterations;
        let mut converged = false;

        for _ in 0..MAX_OUTER_ITERATIONS {
            let family = NegativeBinomialFamily::new(theta);
            let previous_deviance = state.deviance;
            state = irls(x, y, weights, &family, Some(&state.mu), &self.control)?;
            iterations += state.iterations;

            let previous_theta = theta;
            theta = theta_ml(y, &state.mu, weights, &self.control);

            let deviance_change = (state.deviance - previous_deviance).abs();
            let theta_change = (theta - previous_theta).abs() / previous_theta.max(1.0);
            if deviance_change < 1e-8 * (state.deviance.abs() + 0.1) && theta_change < 1e-8 {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(RegressionError::ConvergenceFailed { iterations });
        }

        // Final pass at the converged θ so scores and bread are consistent
        let family = NegativeBinomialFamily::new(theta);
        state = irls(x, y, weights, &family, Some(&state.mu), &self.control)?;
        let (bread, scores, hat_values) = glm_estimating_functions(x, y, weights, &family, &state)?;

        let p = x.ncols();
        let theta_info = theta_information(y, &state.mu, weights, theta);
        let mut vcov = Mat::zeros(p + 1, p + 1);
        for i in 0..p {
            for j in 0..p {
                vcov[(i, j)] = bread[(i, j)];
            }
        }
        vcov[(p, p)] = if theta_info > 0.0 {
            1.0 / theta_info
        } else {
            f64::NAN
        };

        let mut vcov_names = names.to_vec();
        vcov_names.push(THETA_NAME.to_string());

        let n_effective = effective_n(y.len(), weights);
        log::debug!("negative binomial converged: theta = {theta:.6}, {iterations} IRLS iterations");

        Ok(BackendFit {
            kind: BackendKind::NegativeBinomial,
            coefficients: state.beta,
            coefficient_names: names.to_vec(),
            vcov,
            vcov_names,
            scores,
            bread,
            score_names: names.to_vec(),
            hat_values,
            fitted_values: state.mu,
            linear_predictor: state.eta,
            dispersion: 1.0,
            theta: Some(theta),
            scale: None,
            n_obs: n_effective,
            df_residual: (n_effective - p) as f64,
            iterations,
            absorbed: None,
        })
    }
}

/// Maximum likelihood θ at fixed μ by Newton's method.
///
/// Starts from the moment estimate n / Σ wᵢ (yᵢ/μᵢ - 1)².
pub fn theta_ml(y: &[f64], mu: &[f64], weights: Option<&[f64]>, control: &FitControl) -> f64 {
    let w = |i: usize| weights.map_or(1.0, |w| w[i]);
    let n: f64 = (0..y.len()).map(w).sum();

    let moments: f64 = y
        .iter()
        .zip(mu)
        .enumerate()
        .map(|(i, (&yi, &mi))| w(i) * (yi / mi - 1.0).powi(2))
        .sum();
    let mut theta = if moments > 0.0 { n / moments } else { THETA_BOUNDS.1 };
    theta = theta.clamp(THETA_BOUNDS.0, THETA_BOUNDS.1);

    for _ in 0..control.max_iterations {
        let score = theta_score(y, mu, weights, theta);
        let info = theta_information(y, mu, weights, theta);
        if !info.is_finite() || info.abs() < 1e-300 {
            break;
        }
        let updated = (theta + score / info).clamp(THETA_BOUNDS.0, THETA_BOUNDS.1);
        let delta = (updated - theta).abs();
        theta = updated;
        if delta < control.tolerance.max(1e-12) * theta.max(1.0) {
            break;
        }
    }

    theta
}

/// ∂ℓ/∂θ = Σ wᵢ [ψ(yᵢ+θ) - ψ(θ) + log θ + 1 - log(μᵢ+θ) - (yᵢ+θ)/(μᵢ+θ)].
fn theta_score(y: &[f64], mu: &[f64], weights: Option<&[f64]>, theta: f64) -> f64 {
    y.iter()
        .zip(mu)
        .enumerate()
        .map(|(i, (&yi, &mi))| {
            let w = weights.map_or(1.0, |w| w[i]);
            w * (digamma(yi + theta) - digamma(theta) + theta.ln() + 1.0
                - (mi + theta).ln()
                - (yi + theta) / (mi + theta))
        })
        .sum()
}

/// Observed information -∂²ℓ/∂θ².
fn theta_information(y: &[f64], mu: &[f64], weights: Option<&[f64]>, theta: f64) -> f64 {
    y.iter()
        .zip(mu)
        .enumerate()
        .map(|(i, (&yi, &mi))| {
            let w = weights.map_or(1.0, |w| w[i]);
            w * (-trigamma(yi + theta) + trigamma(theta) - 1.0 / theta + 2.0 / (mi + theta)
                - (yi + theta) / (mi + theta).powi(2))
        })
        .sum()
}

/// Trigamma function ψ'(x) for x > 0.
///
/// Uses the recurrence ψ'(x) = ψ'(x+1) + 1/x² to shift x above 10, then the
/// asymptotic series.
pub(crate) fn trigamma(x: f64) -> f64 {
    let mut x = x;
    let mut acc = 0.0;
    while x < 10.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    acc + inv
        + 0.5 * inv2
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigamma_known_values() {
        // ψ'(1) = π²/6, ψ'(0.5) = π²/2
        let pi2 = std::f64::consts::PI.powi(2);
        assert!((trigamma(1.0) - pi2 / 6.0).abs() < 1e-10);
        assert!((trigamma(0.5) - pi2 / 2.0).abs() < 1e-10);
        assert!((trigamma(20.0) - 0.051_270_822_935_203).abs() < 1e-10);
    }

    #[test]
    fn test_theta_ml_recovers_overdispersion() {
        // Counts with variance well above the mean
        let y = vec![0.0, 0.0, 1.0, 7.0, 2.0, 0.0, 12.0, 3.0, 0.0, 5.0, 1.0, 9.0];
        let m = y.iter().sum::<f64>() / y.len() as f64;
        let mu = vec![m; y.len()];

        let theta = theta_ml(&y, &mu, None, &FitControl::default());
        assert!(theta > 0.1 && theta < 5.0, "theta = {theta}");
        assert!(theta_score(&y, &mu, None, theta).abs() < 1e-6);
    }

    #[test]
    fn test_fit_reports_theta_row() {
        let x = Mat::from_fn(12, 2, |i, j| if j == 0 { 1.0 } else { (i % 4) as f64 });
        let y = vec![0.0, 2.0, 1.0, 9.0, 1.0, 0.0, 6.0, 3.0, 0.0, 4.0, 2.0, 12.0];
        let names = vec!["(Intercept)".to_string(), "x".to_string()];

        let fit = NegativeBinomialRegressor::default()
            .fit(&x, &y, None, &names)
            .unwrap();
        assert_eq!(fit.vcov_names, vec!["(Intercept)", "x", ".theta"]);
        assert_eq!(fit.vcov.nrows(), 3);
        assert_eq!(fit.coefficients.len(), 2);
        assert!(fit.theta.is_some_and(|t| t > 0.0));
        assert!(fit.coefficients[1] > 0.0);
    }
}
