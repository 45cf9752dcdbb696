//! Sandwich covariance estimators.
//!
//! Every estimator here has the form B M B where B is the bread reported by
//! the backend and M a meat built from the per-observation estimating
//! functions. The result is indexed by the fit's `score_names`.

use crate::core::HcType;
use crate::error::{Error, Result};
use crate::solvers::BackendFit;
use crate::utils::{sandwich_product, scale_matrix};
use faer::Mat;
use std::collections::HashMap;

/// Σ ωᵢ sᵢ sᵢ' over the rows of the score matrix.
fn weighted_meat(scores: &Mat<f64>, omega: &[f64]) -> Mat<f64> {
    let q = scores.ncols();
    let mut meat = Mat::zeros(q, q);
    for i in 0..scores.nrows() {
        if omega[i] == 0.0 {
            continue;
        }
        for j in 0..q {
            let sij = omega[i] * scores[(i, j)];
            if sij == 0.0 {
                continue;
            }
            for k in j..q {
                meat[(j, k)] += sij * scores[(i, k)];
            }
        }
    }
    for j in 0..q {
        for k in 0..j {
            meat[(j, k)] = meat[(k, j)];
        }
    }
    meat
}

/// Heteroskedasticity-consistent covariance.
///
/// `k` is the parameter count used by the HC1 and HC4 adjustments.
pub fn vcov_hc(fit: &BackendFit, hc: HcType, k: usize) -> Mat<f64> {
    let n = fit.n_obs as f64;
    let k_f = k as f64;
    let omega: Vec<f64> = fit
        .hat_values
        .iter()
        .map(|&h| {
            let h = h.min(1.0 - 1e-12);
            match hc {
                HcType::HC0 | HcType::HC1 => 1.0,
                HcType::HC2 => 1.0 / (1.0 - h),
                HcType::HC3 => 1.0 / (1.0 - h).powi(2),
                HcType::HC4 => {
                    let delta = (n * h / k_f).min(4.0);
                    1.0 / (1.0 - h).powf(delta)
                }
            }
        })
        .collect();

    let meat = weighted_meat(&fit.scores, &omega);
    let vcov = sandwich_product(&fit.bread, &meat);
    match hc {
        HcType::HC1 => scale_matrix(&vcov, n / (n - k_f)),
        _ => vcov,
    }
}

/// Sum score rows within each cluster: Σ_g S_g S_g' and the cluster count.
pub fn cluster_meat(scores: &Mat<f64>, clusters: &[String]) -> (Mat<f64>, usize) {
    let q = scores.ncols();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<Vec<f64>> = Vec::new();

    for (i, label) in clusters.iter().enumerate() {
        let next = totals.len();
        let g = *index.entry(label.as_str()).or_insert(next);
        if g == totals.len() {
            totals.push(vec![0.0; q]);
        }
        for j in 0..q {
            totals[g][j] += scores[(i, j)];
        }
    }

    let mut meat = Mat::zeros(q, q);
    for total in &totals {
        for j in 0..q {
            for k in 0..q {
                meat[(j, k)] += total[j] * total[k];
            }
        }
    }
    (meat, totals.len())
}

/// Cluster-robust covariance with the CR1 adjustment
/// G/(G - 1) · (n - 1)/(n - k).
pub fn vcov_cluster(fit: &BackendFit, clusters: &[String], k: usize) -> Result<Mat<f64>> {
    if clusters.len() != fit.scores.nrows() {
        return Err(Error::InvalidData(format!(
            "cluster variable has {} values for {} observations",
            clusters.len(),
            fit.scores.nrows()
        )));
    }

    let (meat, n_clusters) = cluster_meat(&fit.scores, clusters);
    if n_clusters < 2 {
        return Err(Error::InvalidData(
            "clustered covariance needs at least two clusters".to_string(),
        ));
    }

    let n = fit.n_obs as f64;
    let g = n_clusters as f64;
    let adjustment = g / (g - 1.0) * (n - 1.0) / (n - k as f64);
    log::debug!("cluster-robust covariance: {n_clusters} clusters, k = {k}, adjustment {adjustment:.6}");

    Ok(scale_matrix(&sandwich_product(&fit.bread, &meat), adjustment))
}
