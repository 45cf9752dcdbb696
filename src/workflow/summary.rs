//! Coefficient tables for fitted models.

use super::fitted::FittedModel;
use crate::core::VcovType;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::fmt;

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Estimate divided by its standard error.
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Printable overview of a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model_name: String,
    pub description: String,
    pub formula: String,
    pub n_obs: usize,
    pub vcov_type: VcovType,
    pub is_survey: bool,
    pub fixed_effects: Vec<String>,
    /// Reference distribution of the test statistic: Student t with the
    /// residual degrees of freedom for least squares, normal otherwise.
    pub df: Option<f64>,
    pub coefficients: Vec<CoefficientRow>,
}

impl ModelSummary {
    pub fn from_model(model: &FittedModel) -> Self {
        let fit = model.fit();
        let df = (model.model_name() == "ls"
            && model.vcov_type() == VcovType::Default
            && !model.is_survey()
            && fit.df_residual > 0.0)
            .then_some(fit.df_residual);

        let coefficients = model
            .coefficient_names()
            .iter()
            .zip(model.coefficients())
            .zip(model.std_errors())
            .map(|((name, &estimate), std_error)| {
                let statistic = if std_error > 0.0 { estimate / std_error } else { f64::NAN };
                CoefficientRow {
                    name: name.clone(),
                    estimate,
                    std_error,
                    statistic,
                    p_value: two_sided_p(statistic, df),
                }
            })
            .collect();

        let formula = model
            .full_formula()
            .unwrap_or_else(|| model.formula())
            .to_string();

        Self {
            model_name: model.model_name().to_string(),
            description: model.model().description().to_string(),
            formula,
            n_obs: model.n_obs(),
            vcov_type: model.vcov_type(),
            is_survey: model.is_survey(),
            fixed_effects: model.fixed_effect_variables().to_vec(),
            df,
            coefficients,
        }
    }

    /// Row for `name`, if the model has that coefficient.
    pub fn coefficient(&self, name: &str) -> Option<&CoefficientRow> {
        self.coefficients.iter().find(|r| r.name == name)
    }
}

fn two_sided_p(statistic: f64, df: Option<f64>) -> f64 {
    if !statistic.is_finite() {
        return f64::NAN;
    }
    let upper = match df {
        Some(df) => match StudentsT::new(0.0, 1.0, df) {
            Ok(t) => 1.0 - t.cdf(statistic.abs()),
            Err(_) => return f64::NAN,
        },
        None => 1.0 - Normal::standard().cdf(statistic.abs()),
    };
    (2.0 * upper).clamp(0.0, 1.0)
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: {} ({})", self.model_name, self.description)?;
        writeln!(f, "Formula: {}", self.formula)?;
        writeln!(f, "Observations: {}", self.n_obs)?;
        writeln!(f, "Covariance: {}", self.vcov_type)?;
        if self.is_survey {
            writeln!(f, "Survey design: yes")?;
        }
        if !self.fixed_effects.is_empty() {
            writeln!(f, "Fixed effects: {}", self.fixed_effects.join(", "))?;
        }
        writeln!(f)?;

        let stat = if self.df.is_some() { "t value" } else { "z value" };
        let width = self
            .coefficients
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max(11);
        writeln!(
            f,
            "{:<width$} {:>12} {:>12} {:>10} {:>10}",
            "", "Estimate", "Std. Error", stat, "Pr(>|.|)"
        )?;
        for row in &self.coefficients {
            writeln!(
                f,
                "{:<width$} {:>12.6} {:>12.6} {:>10.3} {:>10.4}",
                row.name, row.estimate, row.std_error, row.statistic, row.p_value
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normal_p_value() {
        assert_relative_eq!(two_sided_p(1.959964, None), 0.05, epsilon = 1e-5);
        assert!(two_sided_p(f64::NAN, None).is_nan());
    }

    #[test]
    fn test_t_p_value_is_wider_than_normal() {
        assert!(two_sided_p(2.0, Some(5.0)) > two_sided_p(2.0, None));
    }
}
