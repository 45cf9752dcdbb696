//! Fitting backends: least squares, IRLS GLMs, negative binomial, tobit and
//! quantile regression.

mod glm;
mod linear;
mod negative_binomial;
mod quantile;
mod tobit;
mod traits;

pub use glm::GlmRegressor;
pub use linear::LinearRegressor;
pub use negative_binomial::{theta_ml, NegativeBinomialRegressor, THETA_NAME};
pub use quantile::{hall_sheather_bandwidth, QuantileRegressor};
pub use tobit::{TobitRegressor, LOG_SCALE_NAME};
pub use traits::{
    AbsorbedEffects, BackendFit, BackendKind, EffectDimension, FitControl, RegressionError,
    Regressor,
};
