//! Fixed-effects adapter.
//!
//! Fixed effects come either inline (`y ~ x | firm + year`) or out of band
//! through [`FixefSpec`]. They are estimated as group intercepts: the first
//! dimension gets one intercept per level and replaces the global intercept,
//! later dimensions are coded against their first level. Only the slopes are
//! reported as coefficients; the level effects are kept in
//! [`AbsorbedEffects`] so scenarios can add them back as an offset.

use super::{FitSettings, ModelFamily};
use crate::core::{DataFrame, Factor, FixefSpec, Formula, Value};
use crate::error::{Error, Result};
use crate::inference::vcov_cluster;
use crate::solvers::{AbsorbedEffects, BackendFit, EffectDimension};
use faer::Mat;
use std::collections::HashMap;

/// Families that can absorb fixed effects.
pub const SUPPORTED_MODELS: [&str; 6] = ["ls", "logit", "probit", "poisson", "negbin", "gamma"];

/// A formula split into its covariate part and its fixed-effect variables.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedEffectsFormula {
    /// Covariates and fixed effects, in inline syntax.
    pub full: Formula,
    /// Covariates only.
    pub linear: Formula,
    pub variables: Vec<String>,
}

/// Whether `formula` or `fixef` requests fixed effects.
pub fn has_fixed_effects(formula: &Formula, fixef: Option<&FixefSpec>) -> bool {
    fixef.is_some() || !formula.fixed_effects().is_empty()
}

/// Normalize inline and out-of-band fixed effects to one shape.
pub fn parse(formula: &Formula, fixef: Option<&FixefSpec>) -> Result<FixedEffectsFormula> {
    let mut variables: Vec<String> = formula.fixed_effects().to_vec();
    let extra = match fixef {
        Some(FixefSpec::Formula(text)) => Formula::one_sided_variables(text)?,
        Some(FixefSpec::Names(names)) => names.clone(),
        None => Vec::new(),
    };
    for name in extra {
        if !variables.contains(&name) {
            variables.push(name);
        }
    }
    if variables.is_empty() {
        return Err(Error::InvalidFormula {
            formula: formula.to_string(),
            hint: "no fixed-effect variables were given".to_string(),
        });
    }

    let linear = formula.linear_part();
    Ok(FixedEffectsFormula {
        full: linear.with_fixed_effects(&variables),
        linear,
        variables,
    })
}

/// Fail unless `model` can absorb fixed effects.
pub fn ensure_supported(model: &dyn ModelFamily) -> Result<()> {
    if model.supports_fixed_effects() {
        Ok(())
    } else {
        Err(Error::UnsupportedFixedEffects {
            model: model.name().to_string(),
            supported: SUPPORTED_MODELS.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// Fit `model` with fixed effects on `variables`.
///
/// `x` holds the slope columns only (no intercept). The reported covariance
/// is clustered on the first fixed-effect dimension.
#[allow(clippy::too_many_arguments)]
pub fn fit(
    model: &dyn ModelFamily,
    x: &Mat<f64>,
    y: &[f64],
    weights: Option<&[f64]>,
    slope_names: &[String],
    data: &DataFrame,
    variables: &[String],
    settings: &FitSettings,
) -> Result<BackendFit> {
    ensure_supported(model)?;

    let n = x.nrows();
    let p = x.ncols();
    let factors = variables
        .iter()
        .map(|v| group_factor(data, v))
        .collect::<Result<Vec<_>>>()?;

    // Dummy columns: every level of the first dimension, all but the first
    // level of the others.
    let mut names = slope_names.to_vec();
    let mut blocks: Vec<(usize, usize)> = Vec::with_capacity(factors.len());
    for (d, (variable, factor)) in variables.iter().zip(&factors).enumerate() {
        let skip = usize::from(d > 0);
        blocks.push((names.len(), skip));
        for level in factor.levels().iter().skip(skip) {
            names.push(format!("fe::{variable}::{level}"));
        }
    }

    let mut x_full = Mat::zeros(n, names.len());
    for i in 0..n {
        for j in 0..p {
            x_full[(i, j)] = x[(i, j)];
        }
        for (factor, &(start, skip)) in factors.iter().zip(&blocks) {
            let code = factor.codes()[i].ok_or_else(|| {
                Error::InvalidData("missing fixed-effect level in estimation data".to_string())
            })?;
            if code >= skip {
                x_full[(i, start + code - skip)] = 1.0;
            }
        }
    }

    let mut backend = model.fit(&x_full, y, weights, &names, settings)?;

    let dimensions: Vec<EffectDimension> = variables
        .iter()
        .zip(&factors)
        .zip(&blocks)
        .map(|((variable, factor), &(start, skip))| {
            let effects = (0..factor.levels().len())
                .map(|l| {
                    if l < skip {
                        0.0
                    } else {
                        backend.coefficients[start + l - skip]
                    }
                })
                .collect();
            EffectDimension {
                variable: variable.clone(),
                levels: factor.levels().to_vec(),
                effects,
                codes: factor.codes().iter().map(|c| c.unwrap_or(0)).collect(),
            }
        })
        .collect();

    let first = &dimensions[0];
    if first.levels.len() >= 2 {
        backend.vcov = vcov_cluster(&backend, &first.row_labels(), p)?;
        backend.vcov_names = backend.score_names.clone();
    } else {
        log::debug!("single level in `{}`; keeping model-based covariance", first.variable);
    }

    log::debug!(
        "fixed effects absorbed: {}",
        dimensions
            .iter()
            .map(|d| format!("{} ({} levels)", d.variable, d.levels.len()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    backend.coefficients.truncate(p);
    backend.coefficient_names = slope_names.to_vec();
    backend.absorbed = Some(AbsorbedEffects { dimensions });
    Ok(backend)
}

fn group_factor(data: &DataFrame, variable: &str) -> Result<Factor> {
    let column = data.column(variable).ok_or_else(|| {
        Error::InvalidData(format!("fixed-effect variable `{variable}` not found in data"))
    })?;
    let labels: Vec<Option<String>> = (0..data.n_rows()).map(|i| column.label(i)).collect();
    Ok(Factor::from_values(&labels))
}

/// Offset added to the linear predictor for a scenario.
///
/// Each dimension contributes the effect of the requested level, or the mean
/// effect across levels when no level (or an unknown level) is requested.
pub fn fe_contribution(absorbed: Option<&AbsorbedEffects>, levels: &HashMap<String, Value>) -> f64 {
    let Some(absorbed) = absorbed else {
        return 0.0;
    };
    absorbed
        .dimensions
        .iter()
        .map(|dim| match levels.get(&dim.variable) {
            Some(value) => {
                let label = value.label();
                dim.effect_of(&label).unwrap_or_else(|| {
                    log::warn!(
                        "level `{label}` of fixed effect `{}` was not estimated; using the mean effect",
                        dim.variable
                    );
                    dim.mean_effect()
                })
            }
            None => dim.mean_effect(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry;

    fn panel() -> DataFrame {
        let firms = ["a", "a", "a", "b", "b", "b", "c", "c", "c", "d", "d", "d"];
        let x: Vec<f64> = (0..12).map(|i| (i % 3) as f64 + 0.1 * i as f64).collect();
        let shift = |f: &str| match f {
            "a" => 1.0,
            "b" => 3.0,
            "c" => -2.0,
            _ => 0.5,
        };
        let noise = [0.05, -0.03, 0.02, -0.04, 0.01, 0.03, -0.02, 0.04, -0.01, 0.02, -0.05, 0.01];
        let y: Vec<f64> = (0..12)
            .map(|i| shift(firms[i]) + 2.0 * x[i] + noise[i])
            .collect();
        DataFrame::new()
            .with_numeric("y", y)
            .with_numeric("x", x)
            .with_text("firm", firms.to_vec())
            .build()
            .unwrap()
    }

    #[test]
    fn test_detection_and_parse() {
        let inline = Formula::parse("y ~ x | firm").unwrap();
        assert!(has_fixed_effects(&inline, None));
        let parsed = parse(&inline, None).unwrap();
        assert_eq!(parsed.variables, vec!["firm"]);
        assert!(parsed.linear.fixed_effects().is_empty());

        let plain = Formula::parse("y ~ x").unwrap();
        assert!(!has_fixed_effects(&plain, None));
        let spec = FixefSpec::Formula("~firm".to_string());
        assert!(has_fixed_effects(&plain, Some(&spec)));
        assert_eq!(parse(&plain, Some(&spec)).unwrap().full, inline);
    }

    #[test]
    fn test_unsupported_families() {
        for name in ["tobit", "quantile"] {
            let model = registry().lookup(name).unwrap();
            match ensure_supported(model.as_ref()) {
                Err(Error::UnsupportedFixedEffects { supported, .. }) => {
                    assert_eq!(supported.len(), 6)
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_fit_recovers_slope_and_effects() {
        let data = panel();
        let x = Mat::from_fn(12, 1, |i, _| data.numeric("x").unwrap()[i]);
        let y = data.numeric("y").unwrap().to_vec();
        let model = registry().lookup("ls").unwrap();
        let fit = fit(
            model.as_ref(),
            &x,
            &y,
            None,
            &["x".to_string()],
            &data,
            &["firm".to_string()],
            &FitSettings::default(),
        )
        .unwrap();

        assert_eq!(fit.coefficients.len(), 1);
        assert!((fit.coefficients[0] - 2.0).abs() < 0.1);
        let absorbed = fit.absorbed.as_ref().unwrap();
        let b = absorbed.dimensions[0].effect_of("b").unwrap();
        let c = absorbed.dimensions[0].effect_of("c").unwrap();
        assert!((b - c - 5.0).abs() < 0.2);
        assert_eq!(fit.vcov_names.len(), 5);
    }

    #[test]
    fn test_dummy_expansion_matches_within_estimator() {
        let data = panel();
        let xs = data.numeric("x").unwrap().to_vec();
        let ys = data.numeric("y").unwrap().to_vec();
        let model = registry().lookup("ls").unwrap();
        let fit = fit(
            model.as_ref(),
            &Mat::from_fn(12, 1, |i, _| xs[i]),
            &ys,
            None,
            &["x".to_string()],
            &data,
            &["firm".to_string()],
            &FitSettings::default(),
        )
        .unwrap();

        // Slope from demeaning within firm (three rows per firm)
        let demean = |v: &[f64]| -> Vec<f64> {
            v.chunks(3)
                .flat_map(|g| {
                    let m = g.iter().sum::<f64>() / 3.0;
                    g.iter().map(move |a| a - m)
                })
                .collect()
        };
        let (xd, yd) = (demean(&xs), demean(&ys));
        let within = xd.iter().zip(&yd).map(|(a, b)| a * b).sum::<f64>()
            / xd.iter().map(|a| a * a).sum::<f64>();
        assert!((fit.coefficients[0] - within).abs() < 1e-10);

        // Level intercepts are the group means net of the slope
        let firm_a = (ys[..3].iter().sum::<f64>() - within * xs[..3].iter().sum::<f64>()) / 3.0;
        let effect = fit.absorbed.as_ref().unwrap().dimensions[0].effect_of("a").unwrap();
        assert!((effect - firm_a).abs() < 1e-10);
    }

    #[test]
    fn test_contribution_fallbacks() {
        let absorbed = AbsorbedEffects {
            dimensions: vec![EffectDimension {
                variable: "firm".to_string(),
                levels: vec!["a".to_string(), "b".to_string()],
                effects: vec![1.0, 3.0],
                codes: vec![0, 1],
            }],
        };
        let mut levels = HashMap::new();
        assert_eq!(fe_contribution(Some(&absorbed), &levels), 2.0);
        levels.insert("firm".to_string(), Value::from("b"));
        assert_eq!(fe_contribution(Some(&absorbed), &levels), 3.0);
        levels.insert("firm".to_string(), Value::from("zzz"));
        assert_eq!(fe_contribution(Some(&absorbed), &levels), 2.0);
        assert_eq!(fe_contribution(None, &levels), 0.0);
    }
}
