//! Left-censored normal (tobit) regression by maximum likelihood.
//!
//! Parameters are (β, log σ). Newton-Raphson with analytic gradient and
//! Hessian, step halving on the log-likelihood, starting from OLS.

use crate::core::standard_normal_pdf;
use crate::solvers::traits::{
    effective_n, validate_inputs, BackendFit, BackendKind, FitControl, RegressionError, Regressor,
};
use crate::utils::{
    hat_diagonal, invert_spd, linear_predictor, solve_weighted_least_squares, weighted_crossprod,
};
use faer::Mat;
use statrs::function::erf::erfc;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Name of the log-scale row/column in the reported covariance.
pub const LOG_SCALE_NAME: &str = "Log(scale)";

const MAX_STEP_HALVINGS: usize = 40;

/// Tobit regressor with a left-censoring point.
#[derive(Debug, Clone)]
pub struct TobitRegressor {
    censor_left: f64,
    control: FitControl,
}

impl Default for TobitRegressor {
    fn default() -> Self {
        Self::new(0.0, FitControl::default())
    }
}

impl TobitRegressor {
    /// Create a regressor censoring at `censor_left`.
    pub fn new(censor_left: f64, control: FitControl) -> Self {
        Self {
            censor_left,
            control,
        }
    }
}

/// Φ(z) computed through erfc for accuracy in the left tail.
fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z * FRAC_1_SQRT_2)
}

/// Inverse Mills ratio φ(z)/Φ(z).
fn inverse_mills(z: f64) -> f64 {
    let cdf = normal_cdf(z);
    if cdf > 1e-300 {
        standard_normal_pdf(z) / cdf
    } else {
        -z
    }
}

struct Evaluation {
    loglik: f64,
    gradient: Vec<f64>,
    hessian: Mat<f64>,
    scores: Mat<f64>,
}

impl TobitRegressor {
    fn evaluate(&self, x: &Mat<f64>, y: &[f64], weights: Option<&[f64]>, params: &[f64]) -> Evaluation {
        let n = y.len();
        let p = x.ncols();
        let q = p + 1;
        let log_sigma = params[p];
        let sigma = log_sigma.exp();
        let eta = linear_predictor(x, &params[..p]);

        let mut loglik = 0.0;
        let mut gradient = vec![0.0; q];
        let mut hessian = Mat::zeros(q, q);
        let mut scores = Mat::zeros(n, q);

        for i in 0..n {
            let w = weights.map_or(1.0, |w| w[i]);
            if w == 0.0 {
                continue;
            }

            // (d/dβ factor, d/ds, d²/dβdβ' factor, d²/dβds factor, d²/ds²)
            let (ll, g_beta, g_s, h_bb, h_bs, h_ss) = if y[i] > self.censor_left {
                let z = (y[i] - eta[i]) / sigma;
                (
                    -0.5 * z * z - log_sigma - 0.5 * (2.0 * PI).ln(),
                    z / sigma,
                    z * z - 1.0,
                    -1.0 / (sigma * sigma),
                    -2.0 * z / sigma,
                    -2.0 * z * z,
                )
            } else {
                let zc = (self.censor_left - eta[i]) / sigma;
                let lambda = inverse_mills(zc);
                let dlambda = -lambda * (zc + lambda);
                (
                    normal_cdf(zc).max(1e-300).ln(),
                    -lambda / sigma,
                    -lambda * zc,
                    dlambda / (sigma * sigma),
                    (dlambda * zc + lambda) / sigma,
                    dlambda * zc * zc + lambda * zc,
                )
            };

            loglik += w * ll;
            for j in 0..p {
                let s = w * g_beta * x[(i, j)];
                scores[(i, j)] = s;
                gradient[j] += s;
                for k in 0..p {
                    hessian[(j, k)] += w * h_bb * x[(i, j)] * x[(i, k)];
                }
                hessian[(j, p)] += w * h_bs * x[(i, j)];
            }
            scores[(i, p)] = w * g_s;
            gradient[p] += w * g_s;
            hessian[(p, p)] += w * h_ss;
        }
        for j in 0..p {
            hessian[(p, j)] = hessian[(j, p)];
        }

        Evaluation {
            loglik,
            gradient,
            hessian,
            scores,
        }
    }
}

impl Regressor for TobitRegressor {
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
    ) -> Result<BackendFit, RegressionError> {
        validate_inputs(x, y, weights, names)?;
        let p = x.ncols();
        let n_effective = effective_n(y.len(), weights);

        if y.iter().all(|&v| v <= self.censor_left) {
            return Err(RegressionError::InvalidResponse(
                "every observation is censored".to_string(),
            ));
        }

        // OLS start
        let beta0: Vec<f64> = solve_weighted_least_squares(x, y, weights, self.control.rank_tolerance)?
            .iter()
            .copied()
            .collect();
        let fitted0 = linear_predictor(x, &beta0);
        let rss: f64 = (0..y.len())
            .map(|i| weights.map_or(1.0, |w| w[i]) * (y[i] - fitted0[i]).powi(2))
            .sum();
        let sigma0 = (rss / n_effective as f64).sqrt().max(1e-6);

        let mut params = beta0;
        params.push(sigma0.ln());
        let mut current = self.evaluate(x, y, weights, &params);
        let mut iterations = 0;
        let mut converged = false;

        for iteration in 1..=self.control.max_iterations {
            iterations = iteration;
            let neg_hessian = Mat::from_fn(p + 1, p + 1, |i, j| -current.hessian[(i, j)]);
            // BHHH step when the Hessian is not negative definite
            let inverse = match invert_spd(&neg_hessian) {
                Ok(inverse) => inverse,
                Err(_) => invert_spd(&weighted_crossprod(&current.scores, None))?,
            };
            let direction: Vec<f64> = (0..=p)
                .map(|i| (0..=p).map(|j| inverse[(i, j)] * current.gradient[j]).sum())
                .collect();

            let mut step = 1.0;
            let mut halvings = 0;
            let candidate = loop {
                let trial: Vec<f64> = params
                    .iter()
                    .zip(&direction)
                    .map(|(b, d)| b + step * d)
                    .collect();
                let evaluation = self.evaluate(x, y, weights, &trial);
                if evaluation.loglik.is_finite() && evaluation.loglik >= current.loglik - 1e-12 {
                    break Some((trial, evaluation));
                }
                halvings += 1;
                if halvings > MAX_STEP_HALVINGS {
                    break None;
                }
                step *= 0.5;
            };

            let Some((trial, evaluation)) = candidate else {
                converged = true;
                break;
            };

            let change = (evaluation.loglik - current.loglik).abs();
            params = trial;
            current = evaluation;
            if change < self.control.tolerance * (current.loglik.abs() + self.control.tolerance) {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(RegressionError::ConvergenceFailed { iterations });
        }

        let neg_hessian = Mat::from_fn(p + 1, p + 1, |i, j| -current.hessian[(i, j)]);
        let bread = invert_spd(&neg_hessian)?;
        let sigma = params[p].exp();
        let coefficients = params[..p].to_vec();
        let eta = linear_predictor(x, &coefficients);

        let mut full_names = names.to_vec();
        full_names.push(LOG_SCALE_NAME.to_string());

        let xtx_inverse = invert_spd(&weighted_crossprod(x, weights))?;
        let hat_values = hat_diagonal(x, &xtx_inverse, weights);

        Ok(BackendFit {
            kind: BackendKind::Tobit {
                censor_left: self.censor_left,
            },
            coefficients,
            coefficient_names: names.to_vec(),
            vcov: bread.clone(),
            vcov_names: full_names.clone(),
            scores: current.scores,
            bread,
            score_names: full_names,
            hat_values,
            fitted_values: eta.clone(),
            linear_predictor: eta,
            dispersion: sigma * sigma,
            theta: None,
            scale: Some(sigma),
            n_obs: n_effective,
            df_residual: n_effective as f64 - (p + 1) as f64,
            iterations,
            absorbed: None,
        })
    }
}
