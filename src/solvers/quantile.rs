//! Linear quantile regression.
//!
//! Minimizes Σ wᵢ ρ_τ(yᵢ - xᵢ'β) with ρ_τ(u) = u(τ - 1{u < 0}) by iteratively
//! reweighted least squares on the check loss. The reported covariance is
//! the iid sparsity estimate τ(1 - τ) ŝ² (X'X)⁻¹, with ŝ the Siddiqui
//! difference quotient of residual quantiles at the Hall–Sheather bandwidth.

use crate::core::{standard_normal_pdf, Link};
use crate::solvers::traits::{
    effective_n, validate_inputs, BackendFit, BackendKind, FitControl, RegressionError, Regressor,
};
use crate::utils::{
    hat_diagonal, invert_spd, linear_predictor, quantile, scale_matrix, scale_rows,
    solve_weighted_least_squares, weighted_crossprod,
};
use faer::Mat;

/// Quantile regressor.
#[derive(Debug, Clone)]
pub struct QuantileRegressor {
    tau: f64,
    control: FitControl,
}

impl Default for QuantileRegressor {
    fn default() -> Self {
        Self::new(0.5, FitControl::default())
    }
}

impl QuantileRegressor {
    /// Create a regressor for quantile `tau` in (0, 1).
    pub fn new(tau: f64, control: FitControl) -> Self {
        Self { tau, control }
    }

    fn check_loss(&self, y: &[f64], fitted: &[f64], weights: Option<&[f64]>) -> f64 {
        y.iter()
            .zip(fitted)
            .enumerate()
            .map(|(i, (&yi, &fi))| {
                let u = yi - fi;
                let rho = if u < 0.0 { u * (self.tau - 1.0) } else { u * self.tau };
                weights.map_or(1.0, |w| w[i]) * rho
            })
            .sum()
    }
}

/// Hall–Sheather bandwidth for the sparsity estimate, α = 0.05.
pub fn hall_sheather_bandwidth(tau: f64, n: usize) -> f64 {
    let x0 = Link::Probit.link(tau);
    let f0 = standard_normal_pdf(x0);
    let z = Link::Probit.link(0.975);
    (n as f64).powf(-1.0 / 3.0)
        * z.powf(2.0 / 3.0)
        * ((1.5 * f0 * f0) / (2.0 * x0 * x0 + 1.0)).powf(1.0 / 3.0)
}

impl Regressor for QuantileRegressor {
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
    ) -> Result<BackendFit, RegressionError> {
        validate_inputs(x, y, weights, names)?;
        if !(self.tau > 0.0 && self.tau < 1.0) {
            return Err(RegressionError::NumericalError(format!(
                "tau must lie in (0, 1), got {}",
                self.tau
            )));
        }

        let n = y.len();
        let p = x.ncols();
        let prior = |i: usize| weights.map_or(1.0, |w| w[i]);

        let spread = y.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
        let floor = 1e-8 * spread;

        let mut beta: Vec<f64> = solve_weighted_least_squares(x, y, weights, self.control.rank_tolerance)?
            .iter()
            .copied()
            .collect();
        let mut fitted = linear_predictor(x, &beta);
        let mut loss = self.check_loss(y, &fitted, weights);
        let mut iterations = 0;

        for iteration in 1..=self.control.max_iterations {
            iterations = iteration;
            let irls_weights: Vec<f64> = (0..n)
                .map(|i| {
                    let u = y[i] - fitted[i];
                    let side = if u < 0.0 { 1.0 - self.tau } else { self.tau };
                    prior(i) * side / u.abs().max(floor)
                })
                .collect();

            let candidate: Vec<f64> =
                solve_weighted_least_squares(x, y, Some(&irls_weights), self.control.rank_tolerance)?
                    .iter()
                    .copied()
                    .collect();
            let candidate_fitted = linear_predictor(x, &candidate);
            let candidate_loss = self.check_loss(y, &candidate_fitted, weights);

            if candidate_loss > loss {
                break;
            }
            let improvement = loss - candidate_loss;
            beta = candidate;
            fitted = candidate_fitted;
            loss = candidate_loss;
            if improvement <= self.control.tolerance.max(1e-12) * (loss + floor) {
                break;
            }
        }

        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();
        let n_effective = effective_n(n, weights);

        // Sparsity s = 1/f(F⁻¹(τ)) from residual quantiles
        let h = hall_sheather_bandwidth(self.tau, n_effective);
        let lower = (self.tau - h).max(1e-6);
        let upper = (self.tau + h).min(1.0 - 1e-6);
        let used: Vec<f64> = residuals
            .iter()
            .enumerate()
            .filter(|(i, _)| prior(*i) > 0.0)
            .map(|(_, &r)| r)
            .collect();
        let sparsity = (quantile(&used, upper) - quantile(&used, lower)) / (upper - lower);
        if !(sparsity.is_finite() && sparsity > 0.0) {
            return Err(RegressionError::NumericalError(
                "could not estimate the sparsity of the residual distribution".to_string(),
            ));
        }

        let xtx_inverse = invert_spd(&weighted_crossprod(x, weights))?;
        let vcov = scale_matrix(&xtx_inverse, self.tau * (1.0 - self.tau) * sparsity * sparsity);

        let score_factors: Vec<f64> = residuals
            .iter()
            .enumerate()
            .map(|(i, &r)| prior(i) * (self.tau - if r < 0.0 { 1.0 } else { 0.0 }))
            .collect();
        let scores = scale_rows(x, &score_factors);
        let bread = scale_matrix(&xtx_inverse, sparsity);
        let hat_values = hat_diagonal(x, &xtx_inverse, weights);

        log::debug!(
            "quantile regression tau = {}: {iterations} iterations, sparsity {sparsity:.6}",
            self.tau
        );

        Ok(BackendFit {
            kind: BackendKind::Quantile { tau: self.tau },
            coefficients: beta,
            coefficient_names: names.to_vec(),
            vcov,
            vcov_names: names.to_vec(),
            scores,
            bread,
            score_names: names.to_vec(),
            hat_values,
            linear_predictor: fitted.clone(),
            fitted_values: fitted,
            dispersion: 1.0,
            theta: None,
            scale: None,
            n_obs: n_effective,
            df_residual: (n_effective - p) as f64,
            iterations,
            absorbed: None,
        })
    }
}
