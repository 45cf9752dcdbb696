//! Estimation options and configuration.

use crate::error::Error;
use crate::survey::SurveyDesign;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Heteroskedasticity-consistent covariance flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HcType {
    /// White's estimator, no small-sample adjustment.
    HC0,
    /// HC0 scaled by n/(n - k).
    HC1,
    /// Squared residuals scaled by 1/(1 - h).
    HC2,
    /// Squared residuals scaled by 1/(1 - h)² (jackknife approximation).
    HC3,
    /// Squared residuals scaled by 1/(1 - h)^δ with δ = min(4, n·h/k).
    HC4,
}

impl HcType {
    /// Canonical name, e.g. `"HC1"`.
    pub fn name(&self) -> &'static str {
        match self {
            HcType::HC0 => "HC0",
            HcType::HC1 => "HC1",
            HcType::HC2 => "HC2",
            HcType::HC3 => "HC3",
            HcType::HC4 => "HC4",
        }
    }
}

/// Requested coefficient covariance estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcovType {
    /// Whatever the fitting backend reports (model-based, design-based for
    /// survey fits, clustered for fixed-effects fits).
    #[default]
    Default,
    /// Heteroskedasticity-consistent sandwich.
    Hc(HcType),
    /// Cluster-robust sandwich.
    Cluster,
    /// Nonparametric bootstrap over observations.
    Bootstrap,
}

impl VcovType {
    /// The `"robust"` alias.
    pub fn robust() -> Self {
        VcovType::Hc(HcType::HC1)
    }
}

impl FromStr for VcovType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "default" => Ok(VcovType::Default),
            "robust" => Ok(VcovType::robust()),
            "cluster" => Ok(VcovType::Cluster),
            "bootstrap" => Ok(VcovType::Bootstrap),
            other => match other.to_ascii_uppercase().as_str() {
                "HC0" => Ok(VcovType::Hc(HcType::HC0)),
                "HC1" => Ok(VcovType::Hc(HcType::HC1)),
                "HC2" => Ok(VcovType::Hc(HcType::HC2)),
                "HC3" => Ok(VcovType::Hc(HcType::HC3)),
                "HC4" => Ok(VcovType::Hc(HcType::HC4)),
                _ => Err(Error::UnknownVcovType(s.to_string())),
            },
        }
    }
}

impl fmt::Display for VcovType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcovType::Default => write!(f, "default"),
            VcovType::Hc(hc) => write!(f, "{}", hc.name()),
            VcovType::Cluster => write!(f, "cluster"),
            VcovType::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// How sampling weights are supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightSpec {
    /// One weight per data row.
    Values(Vec<f64>),
    /// Name of a numeric column.
    Column(String),
    /// One-sided formula naming the weight column, e.g. `"~w"`.
    Formula(String),
}

/// How the clustering variable for `vcov_type = "cluster"` is supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterSpec {
    /// One-sided formula, e.g. `"~state"`.
    Formula(String),
    /// Column name.
    Column(String),
    /// One cluster label per data row.
    Values(Vec<String>),
}

/// Out-of-band fixed-effects specification.
#[derive(Debug, Clone, PartialEq)]
pub enum FixefSpec {
    /// One-sided formula, e.g. `"~firm + year"`.
    Formula(String),
    /// Variable names.
    Names(Vec<String>),
}

/// Configuration for [`estimate`](crate::workflow::estimate).
#[derive(Debug, Clone)]
pub struct EstimationOptions {
    /// Sampling or case weights.
    pub weights: Option<WeightSpec>,
    /// A ready-made survey design; takes precedence over the parts below.
    pub survey_design: Option<SurveyDesign>,
    /// PSU identifiers as a one-sided formula (`"~psu"`, `"~1"` for none).
    pub ids: Option<String>,
    /// Strata as a one-sided formula.
    pub strata: Option<String>,
    /// Finite population correction as a one-sided formula.
    pub fpc: Option<String>,
    /// Whether PSU identifiers are only unique within strata.
    pub nest: bool,
    /// Fixed effects supplied outside the formula.
    pub fixef: Option<FixefSpec>,
    /// Covariance estimator (default: model-reported).
    pub vcov_type: VcovType,
    /// Clustering variable for `VcovType::Cluster`.
    pub cluster: Option<ClusterSpec>,
    /// Bootstrap replicates (default: 500).
    pub bootstrap_replicates: usize,
    /// Default number of simulation draws (default: 1000).
    pub simulation_draws: usize,
    /// Seed for bootstrap and simulation draws.
    pub seed: Option<u64>,
    /// Quantile for `quantile` models (default: 0.5).
    pub tau: f64,
    /// Left-censoring point for `tobit` models (default: 0).
    pub censor_left: f64,
    /// Maximum iterations for iterative solvers.
    pub max_iterations: usize,
    /// Convergence tolerance for iterative solvers.
    pub tolerance: f64,
    /// Rank tolerance for QR decomposition.
    pub rank_tolerance: f64,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self {
            weights: None,
            survey_design: None,
            ids: None,
            strata: None,
            fpc: None,
            nest: false,
            fixef: None,
            vcov_type: VcovType::Default,
            cluster: None,
            bootstrap_replicates: 500,
            simulation_draws: 1000,
            seed: None,
            tau: 0.5,
            censor_left: 0.0,
            max_iterations: 100,
            tolerance: 1e-10,
            rank_tolerance: 1e-10,
        }
    }
}

/// Errors that can occur when validating estimation options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("bootstrap_replicates must be at least 2, got {0}")]
    InvalidBootstrapReplicates(usize),
    #[error("simulation_draws must be at least 1, got {0}")]
    InvalidSimulationDraws(usize),
    #[error("tau must be in (0, 1), got {0}")]
    InvalidTau(f64),
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("censor_left must be finite, got {0}")]
    InvalidCensorPoint(f64),
}

impl EstimationOptions {
    /// Create a new builder for estimation options.
    pub fn builder() -> EstimationOptionsBuilder {
        EstimationOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.bootstrap_replicates < 2 {
            return Err(OptionsError::InvalidBootstrapReplicates(
                self.bootstrap_replicates,
            ));
        }
        if self.simulation_draws < 1 {
            return Err(OptionsError::InvalidSimulationDraws(self.simulation_draws));
        }
        if !(self.tau > 0.0 && self.tau < 1.0) {
            return Err(OptionsError::InvalidTau(self.tau));
        }
        if self.tolerance <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.tolerance));
        }
        if self.max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations));
        }
        if !self.censor_left.is_finite() {
            return Err(OptionsError::InvalidCensorPoint(self.censor_left));
        }
        Ok(())
    }

    /// Whether any survey design component was supplied.
    pub fn has_design_parts(&self) -> bool {
        self.survey_design.is_some()
            || self.ids.is_some()
            || self.strata.is_some()
            || self.fpc.is_some()
    }
}

/// Builder for `EstimationOptions`.
#[derive(Debug, Clone, Default)]
pub struct EstimationOptionsBuilder {
    options: EstimationOptions,
}

impl EstimationOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weights.
    pub fn weights(mut self, weights: WeightSpec) -> Self {
        self.options.weights = Some(weights);
        self
    }

    /// Use a pre-built survey design.
    pub fn survey_design(mut self, design: SurveyDesign) -> Self {
        self.options.survey_design = Some(design);
        self
    }

    /// Set the PSU identifier formula.
    pub fn ids(mut self, ids: &str) -> Self {
        self.options.ids = Some(ids.to_string());
        self
    }

    /// Set the strata formula.
    pub fn strata(mut self, strata: &str) -> Self {
        self.options.strata = Some(strata.to_string());
        self
    }

    /// Set the finite population correction formula.
    pub fn fpc(mut self, fpc: &str) -> Self {
        self.options.fpc = Some(fpc.to_string());
        self
    }

    /// Treat PSU identifiers as nested within strata.
    pub fn nest(mut self, nest: bool) -> Self {
        self.options.nest = nest;
        self
    }

    /// Supply fixed effects outside the formula.
    pub fn fixef(mut self, fixef: FixefSpec) -> Self {
        self.options.fixef = Some(fixef);
        self
    }

    /// Set the covariance estimator.
    pub fn vcov_type(mut self, vcov_type: VcovType) -> Self {
        self.options.vcov_type = vcov_type;
        self
    }

    /// Set the clustering variable.
    pub fn cluster(mut self, cluster: ClusterSpec) -> Self {
        self.options.cluster = Some(cluster);
        self
    }

    /// Set the number of bootstrap replicates.
    pub fn bootstrap_replicates(mut self, replicates: usize) -> Self {
        self.options.bootstrap_replicates = replicates;
        self
    }

    /// Set the default number of simulation draws.
    pub fn simulation_draws(mut self, draws: usize) -> Self {
        self.options.simulation_draws = draws;
        self
    }

    /// Fix the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.options.seed = Some(seed);
        self
    }

    /// Set the quantile for quantile regression.
    pub fn tau(mut self, tau: f64) -> Self {
        self.options.tau = tau;
        self
    }

    /// Set the tobit left-censoring point.
    pub fn censor_left(mut self, point: f64) -> Self {
        self.options.censor_left = point;
        self
    }

    /// Set the maximum iterations for iterative solvers.
    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options.max_iterations = max_iter;
        self
    }

    /// Set the convergence tolerance.
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options.tolerance = tol;
        self
    }

    /// Set the rank tolerance for QR decomposition.
    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.options.rank_tolerance = tol;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<EstimationOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build the options without validation.
    pub fn build_unchecked(self) -> EstimationOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = EstimationOptions::default();
        assert_eq!(opts.bootstrap_replicates, 500);
        assert_eq!(opts.simulation_draws, 1000);
        assert_eq!(opts.vcov_type, VcovType::Default);
        assert!((opts.tau - 0.5).abs() < 1e-12);
        assert!(!opts.has_design_parts());
    }

    #[test]
    fn test_builder() {
        let opts = EstimationOptions::builder()
            .vcov_type(VcovType::Cluster)
            .cluster(ClusterSpec::Column("state".to_string()))
            .simulation_draws(250)
            .seed(42)
            .build()
            .unwrap();

        assert_eq!(opts.vcov_type, VcovType::Cluster);
        assert_eq!(opts.simulation_draws, 250);
        assert_eq!(opts.seed, Some(42));
    }

    #[test]
    fn test_validation_invalid_tau() {
        let result = EstimationOptions::builder().tau(1.0).build();
        assert!(matches!(result, Err(OptionsError::InvalidTau(_))));
    }

    #[test]
    fn test_validation_invalid_replicates() {
        let result = EstimationOptions::builder().bootstrap_replicates(1).build();
        assert!(matches!(
            result,
            Err(OptionsError::InvalidBootstrapReplicates(1))
        ));
    }

    #[test]
    fn test_validation_invalid_draws() {
        let result = EstimationOptions::builder().simulation_draws(0).build();
        assert!(matches!(result, Err(OptionsError::InvalidSimulationDraws(0))));
    }

    #[test]
    fn test_validation_invalid_tolerance() {
        let result = EstimationOptions::builder().tolerance(0.0).build();
        assert!(matches!(result, Err(OptionsError::InvalidTolerance(_))));
    }

    #[test]
    fn test_vcov_type_parsing() {
        assert_eq!("default".parse::<VcovType>().unwrap(), VcovType::Default);
        assert_eq!("robust".parse::<VcovType>().unwrap(), VcovType::robust());
        assert_eq!("hc3".parse::<VcovType>().unwrap(), VcovType::Hc(HcType::HC3));
        assert_eq!("cluster".parse::<VcovType>().unwrap(), VcovType::Cluster);
        assert!(matches!(
            "sandwich".parse::<VcovType>(),
            Err(Error::UnknownVcovType(_))
        ));
    }

    #[test]
    fn test_robust_is_hc1() {
        assert_eq!(VcovType::robust(), VcovType::Hc(HcType::HC1));
        assert_eq!(VcovType::robust().to_string(), "HC1");
    }
}
