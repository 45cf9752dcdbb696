//! Model estimation: option validation, extension routing, fitting and
//! covariance resolution.

use super::fitted::{Extension, FittedModel, FixedEffectsInfo, ModelCore, SurveyInfo};
use crate::core::{
    response_vector, ClusterSpec, Column, DataFrame, DesignSpec, EstimationOptions, Formula,
};
use crate::error::{Error, Result};
use crate::inference::{compute_vcov, vcov_survey, VcovRequest};
use crate::models::{fixed_effects, registry, FitSettings, ModelFamily, ModelRegistry};
use crate::survey;
use faer::Mat;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

const CLUSTER_COLUMN: &str = ".cluster";

/// Fit `model` to `data` with the built-in registry.
///
/// ```no_run
/// use simreg_rs::prelude::*;
///
/// # fn run(data: &DataFrame) -> simreg_rs::Result<()> {
/// let fit = estimate("mpg ~ hp + wt", "ls", data, EstimationOptions::default())?;
/// let sims = fit
///     .setx(ScenarioSpec::new().set("hp", 100.0))?
///     .setx1(ScenarioSpec::new().set("hp", 200.0))?
///     .sim(Some(1000))?;
/// println!("{}", sims.simulation().unwrap().summary());
/// # Ok(())
/// # }
/// ```
pub fn estimate(
    formula: &str,
    model: &str,
    data: &DataFrame,
    options: EstimationOptions,
) -> Result<FittedModel> {
    estimate_with_registry(registry(), formula, model, data, options)
}

/// Same as [`estimate`]; kept under the name used by the simulation workflow
/// literature.
pub fn zelig2(
    formula: &str,
    model: &str,
    data: &DataFrame,
    options: EstimationOptions,
) -> Result<FittedModel> {
    estimate(formula, model, data, options)
}

/// [`estimate`] against a caller-supplied registry.
pub fn estimate_with_registry(
    models: &ModelRegistry,
    formula: &str,
    model: &str,
    data: &DataFrame,
    mut options: EstimationOptions,
) -> Result<FittedModel> {
    options.validate()?;

    if !models.contains(model) {
        return Err(Error::InvalidModelName {
            name: model.to_string(),
            available: models.names(),
        });
    }
    let family = models.lookup(model)?;

    let formula = Formula::parse(formula)?;
    if formula.response().is_none() {
        return Err(Error::InvalidFormula {
            formula: formula.to_string(),
            hint: "the model formula needs a response on the left of `~`".to_string(),
        });
    }
    if data.n_rows() == 0 {
        return Err(Error::InvalidData("data has no rows".to_string()));
    }

    let mut data = data.clone();
    if let Some(ClusterSpec::Values(values)) = &options.cluster {
        let labels = values.iter().cloned().map(Some).collect();
        data.insert(CLUSTER_COLUMN, Column::Text(labels))?;
        options.cluster = Some(ClusterSpec::Column(CLUSTER_COLUMN.to_string()));
    }

    log::info!(
        "estimating `{model}` model on {} rows: {formula}",
        data.n_rows()
    );

    let core = if fixed_effects::has_fixed_effects(&formula, options.fixef.as_ref()) {
        estimate_fixed_effects(family, &formula, data, &options)?
    } else {
        estimate_standard(family, &formula, data, &options)?
    };
    Ok(FittedModel::from_core(core))
}

fn estimate_fixed_effects(
    family: Arc<dyn ModelFamily>,
    formula: &Formula,
    mut data: DataFrame,
    options: &EstimationOptions,
) -> Result<ModelCore> {
    let fe = fixed_effects::parse(formula, options.fixef.as_ref())?;
    fixed_effects::ensure_supported(family.as_ref())?;
    if options.has_design_parts() {
        log::warn!("survey design components are ignored for fixed-effects models; only weights are used");
    }

    let weight_column = options
        .weights
        .as_ref()
        .map(|w| survey::weight_column(&mut data, w))
        .transpose()?;

    let mut variables = fe.full.variables();
    variables.extend(weight_column.iter().cloned());
    variables.extend(cluster_variable(options.cluster.as_ref())?);
    let data = complete_cases(&data, &variables)?;

    let design = DesignSpec::new(&fe.linear, &data, true)?;
    let x = design.model_matrix(&data)?;
    let y = response_vector(&fe.linear, &data)?;
    let weights = weight_column
        .as_deref()
        .map(|name| normalized_column(&data, name))
        .transpose()?;

    let settings = FitSettings::from_options(options);
    let fit = fixed_effects::fit(
        family.as_ref(),
        &x,
        &y,
        weights.as_deref(),
        design.column_names(),
        &data,
        &fe.variables,
        &settings,
    )?;
    log::debug!(
        "absorbed fixed effects on {} ({} slopes)",
        fe.variables.join(", "),
        fit.coefficients.len()
    );

    let request = VcovRequest {
        cluster: options.cluster.as_ref(),
        bootstrap_replicates: options.bootstrap_replicates,
        ..VcovRequest::new(options.vcov_type)
    };
    let mut rng = seeded_rng(options.seed);
    let vcov = compute_vcov(&fit, &request, &data, &mut rng, |_: &[usize]| {
        Ok(Vec::new())
    })?;

    Ok(ModelCore {
        formula: fe.linear.clone(),
        model: family,
        fit,
        vcov,
        data,
        design,
        vcov_type: options.vcov_type,
        extension: Extension::FixedEffects(FixedEffectsInfo {
            full_formula: fe.full,
            variables: fe.variables,
        }),
        simulation_draws: options.simulation_draws,
        seed: options.seed,
    })
}

fn estimate_standard(
    family: Arc<dyn ModelFamily>,
    formula: &Formula,
    mut data: DataFrame,
    options: &EstimationOptions,
) -> Result<ModelCore> {
    let design_spec = survey::resolve(&mut data, options)?;
    if design_spec.is_some() && !family.supports_survey() {
        return Err(Error::InvalidSurveyDesign(format!(
            "model `{}` does not support survey weights or designs",
            family.name()
        )));
    }

    let mut variables = formula.variables();
    if let Some(design) = &design_spec {
        variables.extend(design.variables());
    }
    variables.extend(cluster_variable(options.cluster.as_ref())?);
    let data = complete_cases(&data, &variables)?;

    let resolved = design_spec
        .as_ref()
        .map(|d| d.materialize(&data))
        .transpose()?;
    let weights = resolved.as_ref().map(|r| r.normalized_weights());

    let design = DesignSpec::new(formula, &data, false)?;
    let x = design.model_matrix(&data)?;
    let y = response_vector(formula, &data)?;
    let settings = FitSettings::from_options(options);

    let mut fit = family.fit(&x, &y, weights.as_deref(), design.column_names(), &settings)?;
    if let Some(resolved) = &resolved {
        fit.vcov = vcov_survey(&fit.bread, &fit.scores, resolved);
        fit.vcov_names = fit.score_names.clone();
        log::debug!(
            "survey design: {} strata, {} PSUs",
            resolved.n_strata,
            resolved.n_psu
        );
    }

    let request = VcovRequest {
        cluster: options.cluster.as_ref(),
        bootstrap_replicates: options.bootstrap_replicates,
        is_survey: resolved.is_some(),
        ..VcovRequest::new(options.vcov_type)
    };
    let mut rng = seeded_rng(options.seed);
    let refit = |rows: &[usize]| -> Result<Vec<f64>> {
        let xb = Mat::from_fn(rows.len(), x.ncols(), |i, j| x[(rows[i], j)]);
        let yb: Vec<f64> = rows.iter().map(|&i| y[i]).collect();
        let wb: Option<Vec<f64>> = weights
            .as_ref()
            .map(|w| rows.iter().map(|&i| w[i]).collect());
        let refitted = family.fit(&xb, &yb, wb.as_deref(), design.column_names(), &settings)?;
        Ok(refitted.coefficients)
    };
    let vcov = compute_vcov(&fit, &request, &data, &mut rng, refit)?;

    let extension = match (design_spec, resolved) {
        (Some(design), Some(resolved)) => Extension::Survey(SurveyInfo { design, resolved }),
        _ => Extension::None,
    };

    Ok(ModelCore {
        formula: formula.clone(),
        model: family,
        fit,
        vcov,
        data,
        design,
        vcov_type: options.vcov_type,
        extension,
        simulation_draws: options.simulation_draws,
        seed: options.seed,
    })
}

/// Column named by a cluster specification, if it names one.
fn cluster_variable(spec: Option<&ClusterSpec>) -> Result<Option<String>> {
    match spec {
        Some(ClusterSpec::Column(name)) => Ok(Some(name.clone())),
        Some(ClusterSpec::Formula(text)) => {
            Ok(Formula::one_sided_variables(text)?.into_iter().next())
        }
        Some(ClusterSpec::Values(_)) | None => Ok(None),
    }
}

/// Factorized frame restricted to rows observed on every variable.
fn complete_cases(data: &DataFrame, variables: &[String]) -> Result<DataFrame> {
    let rows = data.complete_cases(variables)?;
    if rows.is_empty() {
        return Err(Error::InvalidData(
            "no complete cases remain after removing missing values".to_string(),
        ));
    }
    let dropped = data.n_rows() - rows.len();
    if dropped > 0 {
        log::info!("dropped {dropped} rows with missing values");
    }
    Ok(data.take_rows(&rows).factorize())
}

/// Weight column rescaled to mean one.
fn normalized_column(data: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = data
        .numeric(name)
        .ok_or_else(|| Error::InvalidWeightSpec(format!("weight column `{name}` is not numeric")))?;
    if values.iter().any(|&w| w < 0.0) {
        return Err(Error::InvalidWeightSpec("weights must be non-negative".to_string()));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(Error::InvalidWeightSpec("weights sum to zero".to_string()));
    }
    let scale = values.len() as f64 / total;
    Ok(values.iter().map(|w| w * scale).collect())
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}
