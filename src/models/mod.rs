//! Model registry.
//!
//! Every model family bundles its fitting backend, its parameter sampler and
//! its quantity-of-interest mapping behind [`ModelFamily`]. The built-in
//! families are registered once in a process-wide [`ModelRegistry`];
//! callers that need extra families build their own registry and pass it to
//! [`estimate_with_registry`](crate::workflow::estimate_with_registry).

mod families;
pub mod fixed_effects;

pub use families::{
    BinaryChoice, GammaRegression, LeastSquares, NegativeBinomialCounts, PoissonCounts,
    QuantileModel, TobitModel,
};

use crate::core::EstimationOptions;
use crate::error::{Error, Result};
use crate::solvers::{BackendFit, FitControl};
use crate::utils::cholesky_with_jitter;
use faer::Mat;
use rand::distributions::Distribution;
use rand::RngCore;
use statrs::distribution::Normal;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Outcome scale of a family; decides whether risk ratios are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Continuous,
    Binary,
    Count,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Continuous => "continuous",
            Category::Binary => "binary",
            Category::Count => "count",
        }
    }

    /// Whether ev1/ev is meaningful on this outcome scale.
    pub fn has_risk_ratio(&self) -> bool {
        matches!(self, Category::Binary | Category::Count)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Backend settings derived from [`EstimationOptions`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSettings {
    pub control: FitControl,
    pub tau: f64,
    pub censor_left: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self::from_options(&EstimationOptions::default())
    }
}

impl FitSettings {
    pub fn from_options(options: &EstimationOptions) -> Self {
        Self {
            control: FitControl {
                max_iterations: options.max_iterations,
                tolerance: options.tolerance,
                rank_tolerance: options.rank_tolerance,
            },
            tau: options.tau,
            censor_left: options.censor_left,
        }
    }
}

/// Simulated expected and predicted values at one scenario row.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityDraws {
    pub ev: Vec<f64>,
    pub pv: Vec<f64>,
}

/// A registered model family.
pub trait ModelFamily: Send + Sync + fmt::Debug {
    /// Registry key, e.g. `"logit"`.
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    fn description(&self) -> &str;

    fn supports_fixed_effects(&self) -> bool {
        true
    }

    fn supports_survey(&self) -> bool {
        true
    }

    /// Fit on a complete-case design matrix.
    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit>;

    /// `num × p` matrix of parameter draws; multivariate normal by default.
    fn draw_parameters(
        &self,
        coefficients: &[f64],
        vcov: &Mat<f64>,
        num: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Mat<f64>> {
        multivariate_normal(coefficients, vcov, num, rng)
    }

    /// Outcome-scale mean at linear predictor `eta`.
    fn expected_value(&self, eta: f64, fit: &BackendFit) -> f64;

    /// One draw of the outcome given its expected value.
    fn draw_outcome(&self, ev: f64, eta: f64, fit: &BackendFit, rng: &mut dyn RngCore) -> f64;

    /// ev and pv for every parameter draw at one design row.
    fn quantities_of_interest(
        &self,
        params: &Mat<f64>,
        x_row: &[f64],
        fit: &BackendFit,
        fe_offset: f64,
        rng: &mut dyn RngCore,
    ) -> QuantityDraws {
        evaluate_draws(self, params, x_row, fit, fe_offset, rng)
    }
}

/// η = params·x + offset per draw, mapped through the family's mean and
/// outcome distribution.
pub fn evaluate_draws<M: ModelFamily + ?Sized>(
    model: &M,
    params: &Mat<f64>,
    x_row: &[f64],
    fit: &BackendFit,
    fe_offset: f64,
    rng: &mut dyn RngCore,
) -> QuantityDraws {
    let num = params.nrows();
    let mut ev = Vec::with_capacity(num);
    let mut pv = Vec::with_capacity(num);
    for d in 0..num {
        let eta = x_row
            .iter()
            .enumerate()
            .map(|(j, &x)| params[(d, j)] * x)
            .sum::<f64>()
            + fe_offset;
        let mean = model.expected_value(eta, fit);
        ev.push(mean);
        pv.push(model.draw_outcome(mean, eta, fit, rng));
    }
    QuantityDraws { ev, pv }
}

/// Draw `num` vectors from N(mean, cov) as the rows of a matrix.
pub fn multivariate_normal(
    mean: &[f64],
    cov: &Mat<f64>,
    num: usize,
    rng: &mut dyn RngCore,
) -> Result<Mat<f64>> {
    let p = mean.len();
    if cov.nrows() != p || cov.ncols() != p {
        return Err(Error::InvalidData(format!(
            "covariance is {}×{} for {p} coefficients",
            cov.nrows(),
            cov.ncols()
        )));
    }
    let l = cholesky_with_jitter(cov)?;
    let standard = Normal::standard();

    let mut draws = Mat::zeros(num, p);
    let mut z = vec![0.0; p];
    for d in 0..num {
        for zi in z.iter_mut() {
            *zi = standard.sample(rng);
        }
        for i in 0..p {
            let shift: f64 = (0..=i).map(|k| l[(i, k)] * z[k]).sum();
            draws[(d, i)] = mean[i] + shift;
        }
    }
    Ok(draws)
}

/// Name-keyed collection of model families.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<dyn ModelFamily>>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the eight built-in families.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LeastSquares));
        registry.register(Arc::new(BinaryChoice::logit()));
        registry.register(Arc::new(BinaryChoice::probit()));
        registry.register(Arc::new(PoissonCounts));
        registry.register(Arc::new(NegativeBinomialCounts));
        registry.register(Arc::new(GammaRegression));
        registry.register(Arc::new(TobitModel));
        registry.register(Arc::new(QuantileModel));
        registry
    }

    /// Add a family, replacing any family registered under the same name.
    pub fn register(&mut self, model: Arc<dyn ModelFamily>) {
        self.models.insert(model.name().to_string(), model);
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ModelFamily>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ModelNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}

/// The process-wide registry of built-in families.
pub fn registry() -> &'static ModelRegistry {
    static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ModelRegistry::with_builtin)
}
