//! The estimate → setx → sim workflow.

mod estimate;
mod fitted;
mod scenario;
mod simulate;
mod summary;

pub use estimate::{estimate, estimate_with_registry, zelig2};
pub use fitted::{Extension, FittedModel, FixedEffectsInfo, SurveyInfo};
pub use scenario::{Scenario, ScenarioSpec};
pub use simulate::{Draws, QuantitySummary, SimulationOutput, SimulationSummary};
pub use summary::{CoefficientRow, ModelSummary};
