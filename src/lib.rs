//! Simulation-based interpretation of regression models.
//!
//! Fit a model with [`estimate`], describe covariate scenarios with
//! [`setx`](FittedModel::setx) / [`setx1`](FittedModel::setx1), and simulate
//! expected values, predicted values, first differences and risk ratios with
//! [`sim`](FittedModel::sim). Parameter uncertainty is propagated by drawing
//! coefficients from their asymptotic sampling distribution.
//!
//! Eight model families are built in: `ls`, `logit`, `probit`, `poisson`,
//! `negbin`, `gamma`, `tobit` and `quantile`. Fits can absorb fixed effects,
//! use survey designs, and report heteroskedasticity-consistent,
//! cluster-robust or bootstrap covariances.
//!
//! # Example
//!
//! ```rust,ignore
//! use simreg_rs::prelude::*;
//!
//! let fit = estimate("mpg ~ hp + wt", "ls", &cars, EstimationOptions::default())?;
//! let out = fit
//!     .setx(ScenarioSpec::new().set("hp", 100.0))?
//!     .setx1(ScenarioSpec::new().set("hp", 200.0))?
//!     .sim(Some(1000))?;
//!
//! let sims = out.simulation().unwrap();
//! println!("{}", sims.summary());
//! ```

pub mod core;
pub mod error;
pub mod inference;
pub mod models;
pub mod solvers;
pub mod survey;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        ClusterSpec, Column, DataFrame, EstimationOptions, FixefSpec, Formula, HcType, Value,
        VcovType, WeightSpec,
    };
    pub use crate::error::{Error, Result};
    pub use crate::models::{registry, Category, ModelFamily, ModelRegistry};
    pub use crate::survey::SurveyDesign;
    pub use crate::workflow::{
        estimate, zelig2, Draws, FittedModel, ModelSummary, ScenarioSpec, SimulationOutput,
        SimulationSummary,
    };
}

pub use crate::core::{
    ClusterSpec, DataFrame, EstimationOptions, FixefSpec, Value, VcovType, WeightSpec,
};
pub use crate::error::{Error, Result};
pub use crate::models::{registry, Category, ModelFamily, ModelRegistry};
pub use crate::workflow::{estimate, zelig2, FittedModel, ScenarioSpec};
