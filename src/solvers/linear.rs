//! Weighted least squares backend for the `ls` family.

use crate::solvers::traits::{
    effective_n, validate_inputs, BackendFit, BackendKind, FitControl, RegressionError, Regressor,
};
use crate::utils::{
    hat_diagonal, invert_spd, linear_predictor, scale_matrix, scale_rows,
    solve_weighted_least_squares, weighted_crossprod,
};
use faer::Mat;

/// Weighted least squares regression.
///
/// Minimizes Σ wᵢ (yᵢ - xᵢ'β)². The reported covariance is σ̂²(X'WX)⁻¹ with
/// σ̂² = Σ wᵢ eᵢ² / (n - p), matching R's `lm`.
#[derive(Debug, Clone, Default)]
pub struct LinearRegressor {
    control: FitControl,
}

impl LinearRegressor {
    /// Create a regressor with the given control settings.
    pub fn new(control: FitControl) -> Self {
        Self { control }
    }
}

impl Regressor for LinearRegressor {
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
    ) -> Result<BackendFit, RegressionError> {
        validate_inputs(x, y, weights, names)?;

        let n_samples = x.nrows();
        let n_params = x.ncols();

        let beta = solve_weighted_least_squares(x, y, weights, self.control.rank_tolerance)?;
        let coefficients: Vec<f64> = beta.iter().copied().collect();

        let fitted = linear_predictor(x, &coefficients);
        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(yi, fi)| yi - fi).collect();

        let n_effective = effective_n(n_samples, weights);
        let df_residual = (n_effective - n_params) as f64;
        let rss: f64 = residuals
            .iter()
            .enumerate()
            .map(|(i, e)| weights.map_or(1.0, |w| w[i]) * e * e)
            .sum();
        let sigma2 = if df_residual > 0.0 {
            rss / df_residual
        } else {
            f64::NAN
        };

        let bread = invert_spd(&weighted_crossprod(x, weights))?;
        let vcov = scale_matrix(&bread, sigma2);

        let score_factors: Vec<f64> = residuals
            .iter()
            .enumerate()
            .map(|(i, e)| weights.map_or(1.0, |w| w[i]) * e)
            .collect();
        let scores = scale_rows(x, &score_factors);
        let hat_values = hat_diagonal(x, &bread, weights);

        Ok(BackendFit {
            kind: BackendKind::Linear,
            coefficients,
            coefficient_names: names.to_vec(),
            vcov,
            vcov_names: names.to_vec(),
            scores,
            bread,
            score_names: names.to_vec(),
            hat_values,
            linear_predictor: fitted.clone(),
            fitted_values: fitted,
            dispersion: sigma2,
            theta: None,
            scale: None,
            n_obs: n_effective,
            df_residual,
            iterations: 1,
            absorbed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(p: usize) -> Vec<String> {
        (0..p).map(|j| format!("x{j}")).collect()
    }

    #[test]
    fn test_exact_fit() {
        let x = Mat::from_fn(6, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y: Vec<f64> = (0..6).map(|i| 1.0 + 2.0 * i as f64).collect();

        let fit = LinearRegressor::default().fit(&x, &y, None, &names(2)).unwrap();
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-10);
        assert!((fit.coefficients[1] - 2.0).abs() < 1e-10);
        assert!(fit.dispersion.abs() < 1e-18);
        assert_eq!(fit.df_residual, 4.0);
    }

    #[test]
    fn test_standard_errors_match_lm() {
        // R: summary(lm(y ~ x)) with x = 1:5, y = c(2.1, 3.9, 6.2, 7.8, 10.1)
        // Std. Error: (Intercept) 0.19807, x 0.05972
        let x = Mat::from_fn(5, 2, |i, j| if j == 0 { 1.0 } else { (i + 1) as f64 });
        let y = vec![2.1, 3.9, 6.2, 7.8, 10.1];

        let fit = LinearRegressor::default().fit(&x, &y, None, &names(2)).unwrap();
        assert!((fit.coefficients[0] - 0.05).abs() < 1e-10);
        assert!((fit.coefficients[1] - 1.99).abs() < 1e-10);
        assert!((fit.dispersion - 0.107 / 3.0).abs() < 1e-10);
        assert!((fit.vcov[(0, 0)].sqrt() - 0.198_074_1).abs() < 1e-6);
        assert!((fit.vcov[(1, 1)].sqrt() - 0.059_721_6).abs() < 1e-6);
    }

    #[test]
    fn test_zero_weights_drop_rows() {
        let x = Mat::from_fn(5, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y = vec![0.0, 1.0, 2.0, 3.0, 100.0];
        let w = vec![1.0, 1.0, 1.0, 1.0, 0.0];

        let fit = LinearRegressor::default()
            .fit(&x, &y, Some(&w), &names(2))
            .unwrap();
        assert!(fit.coefficients[0].abs() < 1e-10);
        assert!((fit.coefficients[1] - 1.0).abs() < 1e-10);
        assert_eq!(fit.n_obs, 4);
        assert_eq!(fit.hat_values[4], 0.0);
    }

    #[test]
    fn test_hat_values_sum_to_rank() {
        let x = Mat::from_fn(8, 3, |i, j| match j {
            0 => 1.0,
            1 => i as f64,
            _ => ((i * 7) % 5) as f64,
        });
        let y: Vec<f64> = (0..8).map(|i| (i as f64).sin()).collect();
        let fit = LinearRegressor::default().fit(&x, &y, None, &names(3)).unwrap();
        let trace: f64 = fit.hat_values.iter().sum();
        assert!((trace - 3.0).abs() < 1e-10);
    }
}
