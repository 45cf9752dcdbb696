//! Core traits and the fitted-model handle shared by every backend.

use crate::core::Link;
use faer::Mat;
use thiserror::Error;

/// Errors that can occur during fitting.
#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("dimension mismatch: X has {x_rows} rows but y has {y_len} elements")]
    DimensionMismatch { x_rows: usize, y_len: usize },

    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("matrix is singular or nearly singular")]
    SingularMatrix,

    #[error("covariance matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("convergence failed after {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    #[error("invalid weights: all weights must be finite and non-negative")]
    InvalidWeights,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("numerical error: {0}")]
    NumericalError(String),
}

/// Iteration control for iterative solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitControl {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub rank_tolerance: f64,
}

impl Default for FitControl {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
            rank_tolerance: 1e-10,
        }
    }
}

/// Which estimator produced a [`BackendFit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendKind {
    /// Weighted least squares.
    Linear,
    /// Generalized linear model fitted by IRLS.
    Glm { link: Link },
    /// Negative binomial GLM with ML theta.
    NegativeBinomial,
    /// Left-censored normal regression.
    Tobit { censor_left: f64 },
    /// Linear quantile regression.
    Quantile { tau: f64 },
}

/// One absorbed fixed-effect dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectDimension {
    /// Variable name.
    pub variable: String,
    /// Level labels.
    pub levels: Vec<String>,
    /// Estimated intercept shift of every level (reference levels are 0).
    pub effects: Vec<f64>,
    /// Level index of every estimation row.
    pub codes: Vec<usize>,
}

impl EffectDimension {
    /// Estimated effect of a level, if the level was observed.
    pub fn effect_of(&self, level: &str) -> Option<f64> {
        self.levels
            .iter()
            .position(|l| l == level)
            .map(|i| self.effects[i])
    }

    /// Mean effect across levels.
    pub fn mean_effect(&self) -> f64 {
        if self.effects.is_empty() {
            0.0
        } else {
            self.effects.iter().sum::<f64>() / self.effects.len() as f64
        }
    }

    /// Row labels, for clustering on this dimension.
    pub fn row_labels(&self) -> Vec<String> {
        self.codes.iter().map(|&c| self.levels[c].clone()).collect()
    }
}

/// Fixed effects absorbed into a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsorbedEffects {
    pub dimensions: Vec<EffectDimension>,
}

impl AbsorbedEffects {
    /// Variable names in formula order.
    pub fn variables(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.variable.clone()).collect()
    }
}

/// Fitted-model handle returned by every backend.
///
/// `coefficients` are the reported regression coefficients. The covariance
/// reported by the backend (`vcov`) and the estimating functions (`scores`,
/// `bread`) may cover additional nuisance or absorbed parameters, so each
/// carries its own names.
#[derive(Debug, Clone)]
pub struct BackendFit {
    pub kind: BackendKind,
    pub coefficients: Vec<f64>,
    pub coefficient_names: Vec<String>,
    /// Backend-reported covariance.
    pub vcov: Mat<f64>,
    pub vcov_names: Vec<String>,
    /// Per-observation estimating functions, n × r.
    pub scores: Mat<f64>,
    /// Inverse of the (negative) Hessian of the estimating equations, r × r.
    pub bread: Mat<f64>,
    pub score_names: Vec<String>,
    /// Diagonal of the (weighted) hat matrix.
    pub hat_values: Vec<f64>,
    pub fitted_values: Vec<f64>,
    pub linear_predictor: Vec<f64>,
    /// Residual variance for `Linear`/`Tobit`, φ for GLMs (1 when fixed).
    pub dispersion: f64,
    pub theta: Option<f64>,
    pub scale: Option<f64>,
    pub n_obs: usize,
    pub df_residual: f64,
    pub iterations: usize,
    pub absorbed: Option<AbsorbedEffects>,
}

impl BackendFit {
    /// Residual standard deviation (σ) used for continuous outcome noise.
    pub fn sigma(&self) -> f64 {
        self.scale.unwrap_or_else(|| self.dispersion.sqrt())
    }

    /// Number of parameters entering the estimating functions.
    pub fn n_score_params(&self) -> usize {
        self.score_names.len()
    }
}

/// A fitting backend.
///
/// Implementations take a complete-case design matrix, the outcome and
/// optional non-negative case weights.
pub trait Regressor {
    /// Fit the model.
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
    ) -> Result<BackendFit, RegressionError>;
}

/// Shared input validation.
pub(crate) fn validate_inputs(
    x: &Mat<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    names: &[String],
) -> Result<(), RegressionError> {
    if x.nrows() != y.len() {
        return Err(RegressionError::DimensionMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    if names.len() != x.ncols() {
        return Err(RegressionError::NumericalError(format!(
            "{} coefficient names for {} columns",
            names.len(),
            x.ncols()
        )));
    }
    if let Some(w) = weights {
        if w.len() != y.len() || w.iter().any(|&wi| !wi.is_finite() || wi < 0.0) {
            return Err(RegressionError::InvalidWeights);
        }
    }
    let n_effective = match weights {
        Some(w) => w.iter().filter(|&&wi| wi > 0.0).count(),
        None => y.len(),
    };
    if n_effective < x.ncols().max(1) {
        return Err(RegressionError::InsufficientObservations {
            needed: x.ncols().max(1),
            got: n_effective,
        });
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(RegressionError::InvalidResponse(
            "response contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Number of observations with positive weight.
pub(crate) fn effective_n(n: usize, weights: Option<&[f64]>) -> usize {
    weights.map_or(n, |w| w.iter().filter(|&&wi| wi > 0.0).count())
}
