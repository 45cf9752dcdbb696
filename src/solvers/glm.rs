//! Iteratively reweighted least squares for generalized linear models.
//!
//! One IRLS loop serves the binomial (logit/probit), Poisson, gamma and
//! negative binomial families. Convergence is judged on the relative change
//! in deviance, as in R's `glm.fit`, with step halving whenever an update
//! leaves the valid mean range of the family.

use crate::core::GlmFamily;
use crate::solvers::traits::{
    effective_n, validate_inputs, BackendFit, BackendKind, FitControl, RegressionError, Regressor,
};
use crate::utils::{
    hat_diagonal, invert_spd, linear_predictor, scale_matrix, scale_rows,
    solve_weighted_least_squares, weighted_crossprod,
};
use faer::Mat;

const MAX_STEP_HALVINGS: usize = 30;

/// Converged state of an IRLS run.
#[derive(Debug, Clone)]
pub(crate) struct IrlsState {
    pub beta: Vec<f64>,
    pub eta: Vec<f64>,
    pub mu: Vec<f64>,
    pub deviance: f64,
    pub iterations: usize,
}

/// Run IRLS to convergence.
///
/// `start_mu` overrides the family's starting values (used when the
/// negative binomial solver warm-starts from the previous theta).
pub(crate) fn irls(
    x: &Mat<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    family: &dyn GlmFamily,
    start_mu: Option<&[f64]>,
    control: &FitControl,
) -> Result<IrlsState, RegressionError> {
    let n = y.len();
    let link = family.link();
    let prior = |i: usize| weights.map_or(1.0, |w| w[i]);

    let mut mu: Vec<f64> = match start_mu {
        Some(m) => m.to_vec(),
        None => family.initialize_mu(y),
    };
    let mut eta: Vec<f64> = mu.iter().map(|&m| link.link(m)).collect();
    let mut beta: Option<Vec<f64>> = None;
    let mut deviance = total_deviance(family, y, &mu, weights);

    for iteration in 1..=control.max_iterations {
        let mut z = vec![0.0; n];
        let mut w = vec![0.0; n];
        for i in 0..n {
            let d = link.mu_eta(eta[i]);
            let var = family.variance(mu[i]);
            z[i] = eta[i] + (y[i] - mu[i]) / d;
            w[i] = prior(i) * d * d / var;
        }

        let candidate: Vec<f64> = solve_weighted_least_squares(x, &z, Some(&w), control.rank_tolerance)?
            .iter()
            .copied()
            .collect();

        let mut step = candidate;
        let mut new_eta = linear_predictor(x, &step);
        let mut new_mu: Vec<f64> = new_eta.iter().map(|&e| link.link_inverse(e)).collect();
        let mut new_deviance = total_deviance(family, y, &new_mu, weights);

        let mut halvings = 0;
        while !(new_deviance.is_finite() && new_mu.iter().all(|&m| family.valid_mu(m))) {
            let Some(previous) = beta.as_ref() else {
                return Err(RegressionError::NumericalError(
                    "no valid starting coefficients; fitted means left the family's range"
                        .to_string(),
                ));
            };
            halvings += 1;
            if halvings > MAX_STEP_HALVINGS {
                return Err(RegressionError::NumericalError(
                    "step halving failed to find valid fitted means".to_string(),
                ));
            }
            step = step
                .iter()
                .zip(previous)
                .map(|(s, b)| 0.5 * (s + b))
                .collect();
            new_eta = linear_predictor(x, &step);
            new_mu = new_eta.iter().map(|&e| link.link_inverse(e)).collect();
            new_deviance = total_deviance(family, y, &new_mu, weights);
        }

        let change = (new_deviance - deviance).abs() / (new_deviance.abs() + 0.1);
        beta = Some(step);
        eta = new_eta;
        mu = new_mu;
        deviance = new_deviance;

        if change < control.tolerance && iteration > 1 {
            return Ok(IrlsState {
                beta: beta.unwrap_or_default(),
                eta,
                mu,
                deviance,
                iterations: iteration,
            });
        }
    }

    Err(RegressionError::ConvergenceFailed {
        iterations: control.max_iterations,
    })
}

/// Σ wᵢ d(yᵢ, μᵢ).
pub(crate) fn total_deviance(
    family: &dyn GlmFamily,
    y: &[f64],
    mu: &[f64],
    weights: Option<&[f64]>,
) -> f64 {
    y.iter()
        .zip(mu)
        .enumerate()
        .map(|(i, (&yi, &mi))| weights.map_or(1.0, |w| w[i]) * family.unit_deviance(yi, mi))
        .sum()
}

/// Bread, scores and hat values at a converged IRLS state.
///
/// Scores are the estimating functions wᵢ (yᵢ - μᵢ) μ'(ηᵢ) / V(μᵢ) xᵢ; the
/// bread is the unscaled inverse Fisher information (X'WX)⁻¹.
pub(crate) fn glm_estimating_functions(
    x: &Mat<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    family: &dyn GlmFamily,
    state: &IrlsState,
) -> Result<(Mat<f64>, Mat<f64>, Vec<f64>), RegressionError> {
    let link = family.link();
    let n = y.len();
    let mut working = vec![0.0; n];
    let mut factors = vec![0.0; n];
    for i in 0..n {
        let prior = weights.map_or(1.0, |w| w[i]);
        let d = link.mu_eta(state.eta[i]);
        let var = family.variance(state.mu[i]);
        working[i] = prior * d * d / var;
        factors[i] = prior * (y[i] - state.mu[i]) * d / var;
    }

    let bread = invert_spd(&weighted_crossprod(x, Some(&working)))?;
    let scores = scale_rows(x, &factors);
    let hat_values = hat_diagonal(x, &bread, Some(&working));
    Ok((bread, scores, hat_values))
}

/// Pearson estimate of the dispersion: Σ wᵢ (yᵢ - μᵢ)² / V(μᵢ) / (n - p).
pub(crate) fn pearson_dispersion(
    family: &dyn GlmFamily,
    y: &[f64],
    mu: &[f64],
    weights: Option<&[f64]>,
    df_residual: f64,
) -> f64 {
    let chi2: f64 = y
        .iter()
        .zip(mu)
        .enumerate()
        .map(|(i, (&yi, &mi))| weights.map_or(1.0, |w| w[i]) * (yi - mi).powi(2) / family.variance(mi))
        .sum();
    chi2 / df_residual
}

/// Check the response lies in the family's support.
pub(crate) fn validate_response(family: &dyn GlmFamily, y: &[f64]) -> Result<(), RegressionError> {
    let (ok, expected) = match family.name() {
        "binomial" => (y.iter().all(|&v| (0.0..=1.0).contains(&v)), "values in [0, 1]"),
        "poisson" | "negative binomial" => (y.iter().all(|&v| v >= 0.0), "non-negative counts"),
        "Gamma" => (y.iter().all(|&v| v > 0.0), "strictly positive values"),
        _ => (true, ""),
    };
    if ok {
        Ok(())
    } else {
        Err(RegressionError::InvalidResponse(format!(
            "the {} family needs {expected}",
            family.name()
        )))
    }
}

/// Generalized linear model fitted by IRLS.
#[derive(Debug, Clone)]
pub struct GlmRegressor<F: GlmFamily> {
    family: F,
    control: FitControl,
}

impl<F: GlmFamily> GlmRegressor<F> {
    /// Create a regressor for the given family.
    pub fn new(family: F, control: FitControl) -> Self {
        Self { family, control }
    }
}

impl<F: GlmFamily> Regressor for GlmRegressor<F> {
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
    ) -> Result<BackendFit, RegressionError> {
        validate_inputs(x, y, weights, names)?;
        validate_response(&self.family, y)?;

        let state = irls(x, y, weights, &self.family, None, &self.control)?;
        let (bread, scores, hat_values) =
            glm_estimating_functions(x, y, weights, &self.family, &state)?;

        let n_effective = effective_n(y.len(), weights);
        let df_residual = (n_effective - x.ncols()) as f64;
        let dispersion = if self.family.fixed_dispersion() {
            1.0
        } else {
            pearson_dispersion(&self.family, y, &state.mu, weights, df_residual)
        };

        Ok(BackendFit {
            kind: BackendKind::Glm {
                link: self.family.link(),
            },
            coefficients: state.beta,
            coefficient_names: names.to_vec(),
            vcov: scale_matrix(&bread, dispersion),
            vcov_names: names.to_vec(),
            scores,
            bread,
            score_names: names.to_vec(),
            hat_values,
            fitted_values: state.mu,
            linear_predictor: state.eta,
            dispersion,
            theta: None,
            scale: None,
            n_obs: n_effective,
            df_residual,
            iterations: state.iterations,
            absorbed: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BinomialFamily, GammaFamily, PoissonFamily};

    fn names(p: usize) -> Vec<String> {
        (0..p).map(|j| format!("x{j}")).collect()
    }

    #[test]
    fn test_poisson_saturated_group_means() {
        // Two groups: the MLE reproduces the group means exactly
        let x = Mat::from_fn(6, 2, |i, j| if j == 0 { 1.0 } else if i >= 3 { 1.0 } else { 0.0 });
        let y = vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0];

        let fit = GlmRegressor::new(PoissonFamily, FitControl::default())
            .fit(&x, &y, None, &names(2))
            .unwrap();
        assert!((fit.coefficients[0] - 2.0_f64.ln()).abs() < 1e-8);
        assert!((fit.coefficients[1] - 3.0_f64.ln()).abs() < 1e-8);
        // Var(log mean) = 1 / (n_g * mean_g)
        assert!((fit.vcov[(0, 0)] - 1.0 / 6.0).abs() < 1e-8);
        assert_eq!(fit.dispersion, 1.0);
    }

    #[test]
    fn test_logistic_group_proportions() {
        let x = Mat::from_fn(8, 2, |i, j| if j == 0 { 1.0 } else if i >= 4 { 1.0 } else { 0.0 });
        let y = vec![1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];

        let fit = GlmRegressor::new(BinomialFamily::logistic(), FitControl::default())
            .fit(&x, &y, None, &names(2))
            .unwrap();
        // Group 0: p = 0.25, group 1: p = 0.75
        let logit = |p: f64| (p / (1.0 - p)).ln();
        assert!((fit.coefficients[0] - logit(0.25)).abs() < 1e-8);
        assert!((fit.coefficients[0] + fit.coefficients[1] - logit(0.75)).abs() < 1e-8);
        assert!(fit.fitted_values.iter().all(|&m| m > 0.0 && m < 1.0));
    }

    #[test]
    fn test_gamma_inverse_link_group_means() {
        let x = Mat::from_fn(6, 2, |i, j| if j == 0 { 1.0 } else if i >= 3 { 1.0 } else { 0.0 });
        let y = vec![1.0, 2.0, 3.0, 3.0, 4.0, 5.0];

        let fit = GlmRegressor::new(GammaFamily, FitControl::default())
            .fit(&x, &y, None, &names(2))
            .unwrap();
        // 1/μ per group: 1/2 and 1/4
        assert!((fit.coefficients[0] - 0.5).abs() < 1e-8);
        assert!((fit.coefficients[0] + fit.coefficients[1] - 0.25).abs() < 1e-8);
        assert!(fit.dispersion > 0.0);
    }

    #[test]
    fn test_rejects_out_of_support_response() {
        let x = Mat::from_fn(4, 1, |_, _| 1.0);
        let result = GlmRegressor::new(PoissonFamily, FitControl::default()).fit(
            &x,
            &[1.0, -1.0, 2.0, 0.0],
            None,
            &names(1),
        );
        assert!(matches!(result, Err(RegressionError::InvalidResponse(_))));

        let result = GlmRegressor::new(BinomialFamily::probit(), FitControl::default()).fit(
            &x,
            &[1.0, 2.0, 0.0, 0.0],
            None,
            &names(1),
        );
        assert!(matches!(result, Err(RegressionError::InvalidResponse(_))));
    }

    #[test]
    fn test_weights_equal_duplication() {
        let x = Mat::from_fn(4, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y = vec![1.0, 0.0, 3.0, 5.0];
        let w = vec![2.0, 1.0, 1.0, 1.0];

        let weighted = GlmRegressor::new(PoissonFamily, FitControl::default())
            .fit(&x, &y, Some(&w), &names(2))
            .unwrap();

        let x_dup = Mat::from_fn(5, 2, |i, j| {
            let row = if i == 4 { 0 } else { i };
            if j == 0 { 1.0 } else { row as f64 }
        });
        let y_dup = vec![1.0, 0.0, 3.0, 5.0, 1.0];
        let duplicated = GlmRegressor::new(PoissonFamily, FitControl::default())
            .fit(&x_dup, &y_dup, None, &names(2))
            .unwrap();

        for j in 0..2 {
            assert!((weighted.coefficients[j] - duplicated.coefficients[j]).abs() < 1e-8);
        }
    }
}
