//! The fitted-model handle.
//!
//! A [`FittedModel`] shares its estimation results behind an `Arc`; `setx`,
//! `setx1` and `sim` return new handles that carry a different scenario or
//! simulation output, so many explorations can start from one fit.

use super::scenario::{self, Scenario, ScenarioSpec};
use super::simulate::{self, SimulationOutput};
use super::summary::ModelSummary;
use crate::core::{DataFrame, DesignSpec, Formula, VcovType};
use crate::error::{Error, Result};
use crate::inference::align_vcov;
use crate::models::{registry, Category, ModelFamily};
use crate::solvers::BackendFit;
use crate::survey::{ResolvedDesign, SurveyDesign};
use faer::Mat;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed-effects metadata of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedEffectsInfo {
    /// Covariates and fixed effects in inline syntax.
    pub full_formula: Formula,
    pub variables: Vec<String>,
}

/// Survey metadata of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyInfo {
    pub design: SurveyDesign,
    pub resolved: ResolvedDesign,
}

/// Optional extension a fit was estimated with.
#[derive(Debug, Clone, PartialEq)]
pub enum Extension {
    None,
    FixedEffects(FixedEffectsInfo),
    Survey(SurveyInfo),
}

#[derive(Debug)]
pub(crate) struct ModelCore {
    pub(crate) formula: Formula,
    pub(crate) model: Arc<dyn ModelFamily>,
    pub(crate) fit: BackendFit,
    pub(crate) vcov: Mat<f64>,
    pub(crate) data: DataFrame,
    pub(crate) design: DesignSpec,
    pub(crate) vcov_type: VcovType,
    pub(crate) extension: Extension,
    pub(crate) simulation_draws: usize,
    pub(crate) seed: Option<u64>,
}

/// A fitted model together with its current scenarios and simulation output.
#[derive(Debug, Clone)]
pub struct FittedModel {
    core: Arc<ModelCore>,
    scenario: Option<Arc<Scenario>>,
    scenario1: Option<Arc<Scenario>>,
    simulation: Option<Arc<SimulationOutput>>,
}

impl FittedModel {
    pub(crate) fn from_core(core: ModelCore) -> Self {
        Self {
            core: Arc::new(core),
            scenario: None,
            scenario1: None,
            simulation: None,
        }
    }

    /// Wrap a fit produced directly by a solver.
    ///
    /// `formula` and `data` must describe the design the fit was estimated
    /// on; fixed-effect fits need the fixed effects in the formula.
    pub fn from_backend(model_name: &str, formula: &str, data: &DataFrame, fit: BackendFit) -> Result<Self> {
        let model = registry().lookup(model_name)?;
        let formula = Formula::parse(formula)?;

        let rows = data.complete_cases(&formula.variables())?;
        let data = data.take_rows(&rows).factorize();
        let design = DesignSpec::new(&formula.linear_part(), &data, fit.absorbed.is_some())?;

        if design.column_names() != fit.coefficient_names.as_slice() {
            return Err(Error::InvalidData(format!(
                "fit coefficients [{}] do not match the formula's design columns [{}]",
                fit.coefficient_names.join(", "),
                design.column_names().join(", ")
            )));
        }

        let extension = match &fit.absorbed {
            Some(absorbed) => {
                let variables = absorbed.variables();
                Extension::FixedEffects(FixedEffectsInfo {
                    full_formula: formula.linear_part().with_fixed_effects(&variables),
                    variables,
                })
            }
            None => Extension::None,
        };
        let vcov = align_vcov(&fit.vcov, &fit.vcov_names, &fit.coefficient_names);

        Ok(Self::from_core(ModelCore {
            formula: formula.linear_part(),
            model,
            fit,
            vcov,
            data,
            design,
            vcov_type: VcovType::Default,
            extension,
            simulation_draws: 1000,
            seed: None,
        }))
    }

    pub fn model_name(&self) -> &str {
        self.core.model.name()
    }

    pub fn model(&self) -> &dyn ModelFamily {
        self.core.model.as_ref()
    }

    pub fn category(&self) -> Category {
        self.core.model.category()
    }

    /// The covariate formula (without fixed effects).
    pub fn formula(&self) -> &Formula {
        &self.core.formula
    }

    /// The formula including fixed effects, for fixed-effects fits.
    pub fn full_formula(&self) -> Option<&Formula> {
        match &self.core.extension {
            Extension::FixedEffects(info) => Some(&info.full_formula),
            _ => None,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.core.fit.coefficients
    }

    pub fn coefficient_names(&self) -> &[String] {
        &self.core.fit.coefficient_names
    }

    /// Coefficient covariance, aligned with [`coefficients`](Self::coefficients).
    pub fn vcov(&self) -> &Mat<f64> {
        &self.core.vcov
    }

    pub fn std_errors(&self) -> Vec<f64> {
        (0..self.core.vcov.nrows())
            .map(|i| self.core.vcov[(i, i)].max(0.0).sqrt())
            .collect()
    }

    /// The backend fit.
    pub fn fit(&self) -> &BackendFit {
        &self.core.fit
    }

    /// Estimation data: factorized, complete cases only.
    pub fn data(&self) -> &DataFrame {
        &self.core.data
    }

    pub fn n_obs(&self) -> usize {
        self.core.fit.n_obs
    }

    pub fn vcov_type(&self) -> VcovType {
        self.core.vcov_type
    }

    pub fn extension(&self) -> &Extension {
        &self.core.extension
    }

    pub fn is_survey(&self) -> bool {
        matches!(self.core.extension, Extension::Survey(_))
    }

    pub fn is_fixed_effects(&self) -> bool {
        matches!(self.core.extension, Extension::FixedEffects(_))
    }

    pub fn fixed_effect_variables(&self) -> &[String] {
        match &self.core.extension {
            Extension::FixedEffects(info) => &info.variables,
            _ => &[],
        }
    }

    pub fn survey_design(&self) -> Option<&SurveyDesign> {
        match &self.core.extension {
            Extension::Survey(info) => Some(&info.design),
            _ => None,
        }
    }

    /// Levels of every categorical predictor, as seen at estimation time.
    pub fn categorical_levels(&self) -> HashMap<String, Vec<String>> {
        self.core.design.categorical_levels()
    }

    /// Default number of simulation draws.
    pub fn simulation_draws(&self) -> usize {
        self.core.simulation_draws
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_deref()
    }

    pub fn scenario1(&self) -> Option<&Scenario> {
        self.scenario1.as_deref()
    }

    pub fn simulation(&self) -> Option<&SimulationOutput> {
        self.simulation.as_deref()
    }

    /// Set the primary scenario; clears any simulation output.
    pub fn setx(&self, spec: ScenarioSpec) -> Result<Self> {
        let scenario = scenario::build(&self.core, &spec)?;
        Ok(Self {
            core: Arc::clone(&self.core),
            scenario: Some(Arc::new(scenario)),
            scenario1: self.scenario1.clone(),
            simulation: None,
        })
    }

    /// Set the contrast scenario; clears any simulation output.
    pub fn setx1(&self, spec: ScenarioSpec) -> Result<Self> {
        let scenario = scenario::build(&self.core, &spec)?;
        Ok(Self {
            core: Arc::clone(&self.core),
            scenario: self.scenario.clone(),
            scenario1: Some(Arc::new(scenario)),
            simulation: None,
        })
    }

    /// Simulate quantities of interest with `num` draws (default: the value
    /// fixed at estimation time), seeded from the estimation seed when set.
    pub fn sim(&self, num: Option<usize>) -> Result<Self> {
        let mut rng = match self.core.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.sim_with_rng(num, &mut rng)
    }

    /// [`sim`](Self::sim) with a caller-supplied random source.
    pub fn sim_with_rng(&self, num: Option<usize>, rng: &mut dyn RngCore) -> Result<Self> {
        let scenario = self.scenario.as_ref().ok_or(Error::NoScenario)?;
        let num = num.unwrap_or(self.core.simulation_draws);
        if num == 0 {
            return Err(crate::core::OptionsError::InvalidSimulationDraws(num).into());
        }

        let output = simulate::run(
            &self.core,
            Arc::clone(scenario),
            self.scenario1.clone(),
            num,
            rng,
        )?;
        Ok(Self {
            core: Arc::clone(&self.core),
            scenario: self.scenario.clone(),
            scenario1: self.scenario1.clone(),
            simulation: Some(Arc::new(output)),
        })
    }

    /// Coefficient table and model metadata.
    pub fn summary(&self) -> ModelSummary {
        ModelSummary::from_model(self)
    }
}
