//! Crate-level error taxonomy.
//!
//! Every error here is a caller-input or unresolvable-state error. Situations
//! that can be degraded (an unknown fixed-effect level in a scenario, bootstrap
//! covariance on a fixed-effects fit) are logged as warnings instead.

use crate::core::OptionsError;
use crate::solvers::RegressionError;
use thiserror::Error;

/// Errors raised by estimation, scenario construction, and simulation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid formula `{formula}`: {hint}")]
    InvalidFormula { formula: String, hint: String },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("model `{name}` is not available; valid models are: {}", available.join(", "))]
    InvalidModelName { name: String, available: Vec<String> },

    #[error("model `{name}` not found in registry; registered models are: {}", available.join(", "))]
    ModelNotFound { name: String, available: Vec<String> },

    #[error("fixed effects are not supported for model `{model}`; supported models are: {}", supported.join(", "))]
    UnsupportedFixedEffects {
        model: String,
        supported: Vec<String>,
    },

    #[error("vcov_type = \"cluster\" requires a cluster variable")]
    MissingCluster,

    #[error("unknown vcov_type `{0}`; expected one of default, HC0, HC1, HC2, HC3, HC4, robust, cluster, bootstrap")]
    UnknownVcovType(String),

    #[error("invalid weight specification: {0}")]
    InvalidWeightSpec(String),

    #[error("invalid survey design: {0}")]
    InvalidSurveyDesign(String),

    #[error("no scenario set; call setx() before sim()")]
    NoScenario,

    #[error("only one covariate may vary in a scenario, found ranges for: {}", .0.join(", "))]
    MultipleRangeVariables(Vec<String>),

    #[error("level `{level}` of `{variable}` was not observed at estimation time; known levels: {}", levels.join(", "))]
    UnknownCategoricalLevel {
        variable: String,
        level: String,
        levels: Vec<String>,
    },

    #[error("`{0}` is not a variable of the fitted model")]
    UnknownCovariate(String),

    #[error("scenario shapes differ: primary has {primary} rows, contrast has {contrast}")]
    ScenarioShapeMismatch { primary: usize, contrast: usize },

    #[error("bootstrap failed: only {succeeded} of {requested} replicates could be refit")]
    BootstrapFailed { succeeded: usize, requested: usize },

    #[error("estimation failed: {0}")]
    Backend(#[from] RegressionError),

    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
