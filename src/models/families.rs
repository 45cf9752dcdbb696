//! The eight built-in model families.

use super::{evaluate_draws, Category, FitSettings, ModelFamily, QuantityDraws};
use crate::core::{
    standard_normal_cdf, standard_normal_pdf, BinomialFamily, GammaFamily, Link, PoissonFamily,
};
use crate::error::Result;
use crate::solvers::{
    BackendFit, BackendKind, GlmRegressor, LinearRegressor, NegativeBinomialRegressor,
    QuantileRegressor, Regressor, TobitRegressor,
};
use faer::Mat;
use rand::distributions::Distribution;
use rand::{Rng, RngCore};
use statrs::distribution::{Gamma, Normal, Poisson};

fn poisson_draw(lambda: f64, rng: &mut dyn RngCore) -> f64 {
    if lambda == 0.0 {
        return 0.0;
    }
    match Poisson::new(lambda) {
        Ok(dist) => Distribution::<f64>::sample(&dist, rng),
        Err(_) => f64::NAN,
    }
}

fn normal_draw(mean: f64, sd: f64, rng: &mut dyn RngCore) -> f64 {
    if sd <= 0.0 {
        return mean;
    }
    match Normal::new(mean, sd) {
        Ok(dist) => dist.sample(rng),
        Err(_) => f64::NAN,
    }
}

/// Gaussian least squares (`ls`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastSquares;

impl ModelFamily for LeastSquares {
    fn name(&self) -> &str {
        "ls"
    }

    fn category(&self) -> Category {
        Category::Continuous
    }

    fn description(&self) -> &str {
        "Least Squares Regression for Continuous Dependent Variables"
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(LinearRegressor::new(settings.control).fit(x, y, weights, names)?)
    }

    fn expected_value(&self, eta: f64, _fit: &BackendFit) -> f64 {
        eta
    }

    fn draw_outcome(&self, ev: f64, _eta: f64, fit: &BackendFit, rng: &mut dyn RngCore) -> f64 {
        normal_draw(ev, fit.sigma(), rng)
    }
}

/// Binary response with a logit or probit link.
#[derive(Debug, Clone, Copy)]
pub struct BinaryChoice {
    link: Link,
}

impl BinaryChoice {
    pub fn logit() -> Self {
        Self { link: Link::Logit }
    }

    pub fn probit() -> Self {
        Self { link: Link::Probit }
    }

    fn family(&self) -> BinomialFamily {
        match self.link {
            Link::Probit => BinomialFamily::probit(),
            _ => BinomialFamily::logistic(),
        }
    }
}

impl ModelFamily for BinaryChoice {
    fn name(&self) -> &str {
        match self.link {
            Link::Probit => "probit",
            _ => "logit",
        }
    }

    fn category(&self) -> Category {
        Category::Binary
    }

    fn description(&self) -> &str {
        match self.link {
            Link::Probit => "Probit Regression for Dichotomous Dependent Variables",
            _ => "Logistic Regression for Dichotomous Dependent Variables",
        }
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(GlmRegressor::new(self.family(), settings.control).fit(x, y, weights, names)?)
    }

    fn expected_value(&self, eta: f64, _fit: &BackendFit) -> f64 {
        self.link.link_inverse(eta).clamp(0.0, 1.0)
    }

    fn draw_outcome(&self, ev: f64, _eta: f64, _fit: &BackendFit, rng: &mut dyn RngCore) -> f64 {
        if !ev.is_finite() {
            return f64::NAN;
        }
        if rng.gen_bool(ev.clamp(0.0, 1.0)) {
            1.0
        } else {
            0.0
        }
    }
}

/// Poisson counts with log link.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonCounts;

impl ModelFamily for PoissonCounts {
    fn name(&self) -> &str {
        "poisson"
    }

    fn category(&self) -> Category {
        Category::Count
    }

    fn description(&self) -> &str {
        "Poisson Regression for Event Count Dependent Variables"
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(GlmRegressor::new(PoissonFamily, settings.control).fit(x, y, weights, names)?)
    }

    fn expected_value(&self, eta: f64, _fit: &BackendFit) -> f64 {
        Link::Log.link_inverse(eta)
    }

    fn draw_outcome(&self, ev: f64, _eta: f64, _fit: &BackendFit, rng: &mut dyn RngCore) -> f64 {
        poisson_draw(ev, rng)
    }
}

/// Overdispersed counts: negative binomial with ML θ.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeBinomialCounts;

impl NegativeBinomialCounts {
    fn theta(fit: &BackendFit) -> f64 {
        fit.theta.filter(|t| t.is_finite() && *t > 0.0).unwrap_or(1.0)
    }
}

impl ModelFamily for NegativeBinomialCounts {
    fn name(&self) -> &str {
        "negbin"
    }

    fn category(&self) -> Category {
        Category::Count
    }

    fn description(&self) -> &str {
        "Negative Binomial Regression for Event Count Dependent Variables"
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(NegativeBinomialRegressor::new(settings.control).fit(x, y, weights, names)?)
    }

    fn expected_value(&self, eta: f64, _fit: &BackendFit) -> f64 {
        Link::Log.link_inverse(eta)
    }

    /// Gamma–Poisson mixture: λ ~ Gamma(θ, θ/μ), y ~ Poisson(λ).
    fn draw_outcome(&self, ev: f64, _eta: f64, fit: &BackendFit, rng: &mut dyn RngCore) -> f64 {
        let theta = Self::theta(fit);
        match Gamma::new(theta, theta / ev) {
            Ok(mixing) => {
                let lambda = mixing.sample(rng);
                poisson_draw(lambda, rng)
            }
            Err(_) => f64::NAN,
        }
    }

    fn quantities_of_interest(
        &self,
        params: &Mat<f64>,
        x_row: &[f64],
        fit: &BackendFit,
        fe_offset: f64,
        rng: &mut dyn RngCore,
    ) -> QuantityDraws {
        if !fit.theta.is_some_and(|t| t.is_finite() && t > 0.0) {
            log::warn!("negative binomial theta not available on the fit; simulating with theta = 1");
        }
        evaluate_draws(self, params, x_row, fit, fe_offset, rng)
    }
}

/// Gamma regression with inverse link.
#[derive(Debug, Clone, Copy, Default)]
pub struct GammaRegression;

impl ModelFamily for GammaRegression {
    fn name(&self) -> &str {
        "gamma"
    }

    fn category(&self) -> Category {
        Category::Continuous
    }

    fn description(&self) -> &str {
        "Gamma Regression for Continuous, Positive Dependent Variables"
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(GlmRegressor::new(GammaFamily, settings.control).fit(x, y, weights, names)?)
    }

    fn expected_value(&self, eta: f64, _fit: &BackendFit) -> f64 {
        Link::Inverse.link_inverse(eta)
    }

    /// Gamma noise with shape 1/φ and mean `ev`.
    fn draw_outcome(&self, ev: f64, _eta: f64, fit: &BackendFit, rng: &mut dyn RngCore) -> f64 {
        if !(ev > 0.0 && ev.is_finite()) {
            return f64::NAN;
        }
        let shape = 1.0 / fit.dispersion;
        match Gamma::new(shape, shape / ev) {
            Ok(dist) => dist.sample(rng),
            Err(_) => f64::NAN,
        }
    }

    fn quantities_of_interest(
        &self,
        params: &Mat<f64>,
        x_row: &[f64],
        fit: &BackendFit,
        fe_offset: f64,
        rng: &mut dyn RngCore,
    ) -> QuantityDraws {
        let draws = evaluate_draws(self, params, x_row, fit, fe_offset, rng);
        let invalid = draws.ev.iter().filter(|&&m| !(m > 0.0)).count();
        if invalid > 0 {
            log::warn!(
                "{invalid} of {} gamma draws have a non-positive mean; their predicted values are NaN",
                draws.ev.len()
            );
        }
        draws
    }
}

/// Left-censored normal regression.
#[derive(Debug, Clone, Copy, Default)]
pub struct TobitModel;

impl TobitModel {
    fn censor_point(fit: &BackendFit) -> f64 {
        match fit.kind {
            BackendKind::Tobit { censor_left } => censor_left,
            _ => 0.0,
        }
    }
}

impl ModelFamily for TobitModel {
    fn name(&self) -> &str {
        "tobit"
    }

    fn category(&self) -> Category {
        Category::Continuous
    }

    fn description(&self) -> &str {
        "Linear regression for Left-Censored Dependent Variable"
    }

    fn supports_fixed_effects(&self) -> bool {
        false
    }

    fn supports_survey(&self) -> bool {
        false
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(TobitRegressor::new(settings.censor_left, settings.control).fit(x, y, weights, names)?)
    }

    /// E[max(c, y*)] with y* ~ N(η, σ²).
    fn expected_value(&self, eta: f64, fit: &BackendFit) -> f64 {
        let sigma = fit.sigma();
        let c = Self::censor_point(fit);
        let z = (eta - c) / sigma;
        (c + standard_normal_cdf(z) * (eta - c) + sigma * standard_normal_pdf(z)).max(c)
    }

    fn draw_outcome(&self, _ev: f64, eta: f64, fit: &BackendFit, rng: &mut dyn RngCore) -> f64 {
        normal_draw(eta, fit.sigma(), rng).max(Self::censor_point(fit))
    }
}

/// Linear conditional-quantile regression.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantileModel;

impl ModelFamily for QuantileModel {
    fn name(&self) -> &str {
        "quantile"
    }

    fn category(&self) -> Category {
        Category::Continuous
    }

    fn description(&self) -> &str {
        "Quantile Regression for Continuous Dependent Variables"
    }

    fn supports_fixed_effects(&self) -> bool {
        false
    }

    fn supports_survey(&self) -> bool {
        false
    }

    fn fit(
        &self,
        x: &Mat<f64>,
        y: &[f64],
        weights: Option<&[f64]>,
        names: &[String],
        settings: &FitSettings,
    ) -> Result<BackendFit> {
        Ok(QuantileRegressor::new(settings.tau, settings.control).fit(x, y, weights, names)?)
    }

    fn expected_value(&self, eta: f64, _fit: &BackendFit) -> f64 {
        eta
    }

    fn draw_outcome(&self, ev: f64, _eta: f64, _fit: &BackendFit, _rng: &mut dyn RngCore) -> f64 {
        ev
    }
}
