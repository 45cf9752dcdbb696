//! Variance-covariance dispatch.
//!
//! [`compute_vcov`] picks an estimator for a [`BackendFit`] from the requested
//! [`VcovType`] and the fit's extensions, then aligns the result to the
//! fit's coefficient names.

use super::bootstrap::bootstrap_vcov;
use super::sandwich::{vcov_cluster, vcov_hc};
use crate::core::{ClusterSpec, Column, DataFrame, Formula, VcovType};
use crate::error::{Error, Result};
use crate::solvers::{BackendFit, BackendKind};
use faer::Mat;
use rand::Rng;

/// Everything the resolver needs besides the fit itself.
#[derive(Debug, Clone, Copy)]
pub struct VcovRequest<'a> {
    pub vcov_type: VcovType,
    pub cluster: Option<&'a ClusterSpec>,
    pub bootstrap_replicates: usize,
    /// The fit's reported covariance is already design-based.
    pub is_survey: bool,
}

impl<'a> VcovRequest<'a> {
    pub fn new(vcov_type: VcovType) -> Self {
        Self {
            vcov_type,
            cluster: None,
            bootstrap_replicates: 500,
            is_survey: false,
        }
    }
}

/// Coefficient covariance for `fit`.
///
/// `data` is the estimation data (rows aligned with the fit) and is used to
/// resolve cluster variables. `refit` re-estimates the coefficients on a
/// resampled row set and is only called for the bootstrap.
pub fn compute_vcov<R, F>(
    fit: &BackendFit,
    request: &VcovRequest<'_>,
    data: &DataFrame,
    rng: &mut R,
    refit: F,
) -> Result<Mat<f64>>
where
    R: Rng + ?Sized,
    F: FnMut(&[usize]) -> Result<Vec<f64>>,
{
    let (vcov, names) = resolve(fit, request, data, rng, refit)?;
    Ok(align_vcov(&vcov, &names, &fit.coefficient_names))
}

fn resolve<R, F>(
    fit: &BackendFit,
    request: &VcovRequest<'_>,
    data: &DataFrame,
    rng: &mut R,
    refit: F,
) -> Result<(Mat<f64>, Vec<String>)>
where
    R: Rng + ?Sized,
    F: FnMut(&[usize]) -> Result<Vec<f64>>,
{
    if fit.absorbed.is_some() {
        return fixed_effects_vcov(fit, request, data);
    }

    let reported = || (fit.vcov.clone(), fit.vcov_names.clone());
    let is_quantile = matches!(fit.kind, BackendKind::Quantile { .. });

    if is_quantile && (request.vcov_type == VcovType::Default || request.is_survey) {
        log::debug!("vcov: quantile regression sparsity covariance");
        return Ok(reported());
    }
    if request.is_survey || request.vcov_type == VcovType::Default {
        log::debug!(
            "vcov: backend-reported ({})",
            if request.is_survey { "design-based" } else { "model-based" }
        );
        return Ok(reported());
    }

    match request.vcov_type {
        VcovType::Hc(hc) => {
            log::debug!("vcov: {}", hc.name());
            Ok((vcov_hc(fit, hc, fit.n_score_params()), fit.score_names.clone()))
        }
        VcovType::Cluster => {
            let spec = request.cluster.ok_or(Error::MissingCluster)?;
            let clusters = resolve_cluster(spec, data)?;
            log::debug!("vcov: cluster-robust");
            Ok((
                vcov_cluster(fit, &clusters, fit.n_score_params())?,
                fit.score_names.clone(),
            ))
        }
        VcovType::Bootstrap => {
            log::debug!("vcov: bootstrap with {} replicates", request.bootstrap_replicates);
            let vcov = bootstrap_vcov(data.n_rows(), request.bootstrap_replicates, rng, refit)?;
            Ok((vcov, fit.coefficient_names.clone()))
        }
        VcovType::Default => Ok(reported()),
    }
}

/// Covariance for a fit with absorbed fixed effects.
///
/// The reported covariance is clustered on the first fixed-effect dimension.
/// An explicit cluster variable gets the full CR1 correction counting every
/// estimated parameter. The bootstrap is not available and falls back to
/// the reported covariance.
fn fixed_effects_vcov(
    fit: &BackendFit,
    request: &VcovRequest<'_>,
    data: &DataFrame,
) -> Result<(Mat<f64>, Vec<String>)> {
    let reported = (fit.vcov.clone(), fit.vcov_names.clone());
    match request.vcov_type {
        VcovType::Default => {
            log::debug!("vcov: fixed effects, clustered on first dimension");
            Ok(reported)
        }
        VcovType::Hc(hc) => {
            log::debug!("vcov: fixed effects, {}", hc.name());
            Ok((vcov_hc(fit, hc, fit.n_score_params()), fit.score_names.clone()))
        }
        VcovType::Cluster => match request.cluster {
            Some(spec) => {
                let clusters = resolve_cluster(spec, data)?;
                log::debug!("vcov: fixed effects, explicit cluster");
                Ok((
                    vcov_cluster(fit, &clusters, fit.n_score_params())?,
                    fit.score_names.clone(),
                ))
            }
            None => Ok(reported),
        },
        VcovType::Bootstrap => {
            log::warn!(
                "bootstrap covariance is not supported for fixed-effects models; using the default clustered covariance"
            );
            Ok(reported)
        }
    }
}

/// Cluster label of every row of `data`.
pub fn resolve_cluster(spec: &ClusterSpec, data: &DataFrame) -> Result<Vec<String>> {
    let column_name = match spec {
        ClusterSpec::Values(values) => {
            if values.len() != data.n_rows() {
                return Err(Error::InvalidData(format!(
                    "cluster vector has {} values for {} rows",
                    values.len(),
                    data.n_rows()
                )));
            }
            return Ok(values.clone());
        }
        ClusterSpec::Column(name) => name.clone(),
        ClusterSpec::Formula(text) => {
            let mut vars = Formula::one_sided_variables(text)?;
            if vars.len() != 1 {
                return Err(Error::InvalidFormula {
                    formula: text.clone(),
                    hint: "the cluster formula must name exactly one variable".to_string(),
                });
            }
            vars.remove(0)
        }
    };

    let column: &Column = data.column(&column_name).ok_or_else(|| {
        Error::InvalidData(format!("cluster variable `{column_name}` not found in data"))
    })?;
    (0..data.n_rows())
        .map(|i| {
            column.label(i).ok_or_else(|| {
                Error::InvalidData(format!("missing value in cluster variable `{column_name}`"))
            })
        })
        .collect()
}

/// Restrict a covariance to `coefficient_names`.
///
/// Rows are matched by name; if some coefficient has no counterpart the
/// leading block of matching size is used instead.
pub fn align_vcov(vcov: &Mat<f64>, vcov_names: &[String], coefficient_names: &[String]) -> Mat<f64> {
    let p = coefficient_names.len();
    let by_name: Option<Vec<usize>> = coefficient_names
        .iter()
        .map(|c| vcov_names.iter().position(|v| v == c))
        .collect();

    let indices = match by_name {
        Some(indices) => indices,
        None => {
            log::debug!("vcov names do not cover the coefficients; truncating by position");
            (0..p.min(vcov.nrows())).collect()
        }
    };

    Mat::from_fn(indices.len(), indices.len(), |i, j| vcov[(indices[i], indices[j])])
}
