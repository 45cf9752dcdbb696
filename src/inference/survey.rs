//! Design-based (Taylor linearization) covariance for survey fits.

use crate::survey::ResolvedDesign;
use crate::utils::sandwich_product;
use faer::Mat;

/// Meat of the linearization variance.
///
/// Score rows are totalled within PSUs, centered within strata, and each
/// stratum contributes (1 − f_h) n_h/(n_h − 1) Σ (z − z̄)(z − z̄)'. Strata
/// holding a single PSU contribute nothing.
pub fn linearization_meat(scores: &Mat<f64>, design: &ResolvedDesign) -> Mat<f64> {
    let q = scores.ncols();
    let mut psu_totals: Vec<Vec<f64>> = vec![vec![0.0; q]; design.n_psu];
    let mut psu_stratum: Vec<usize> = vec![0; design.n_psu];

    for i in 0..scores.nrows() {
        let c = design.psu[i];
        psu_stratum[c] = design.strata[i];
        for j in 0..q {
            psu_totals[c][j] += scores[(i, j)];
        }
    }

    let mut meat = Mat::zeros(q, q);
    let mut singletons = 0usize;

    for h in 0..design.n_strata {
        let members: Vec<&Vec<f64>> = psu_totals
            .iter()
            .zip(&psu_stratum)
            .filter(|(_, &s)| s == h)
            .map(|(t, _)| t)
            .collect();
        let n_h = members.len();
        if n_h < 2 {
            singletons += 1;
            continue;
        }

        let mut centre = vec![0.0; q];
        for total in &members {
            for j in 0..q {
                centre[j] += total[j] / n_h as f64;
            }
        }

        let fpc = design
            .sampling_fraction
            .as_ref()
            .map_or(1.0, |f| 1.0 - f[h]);
        let factor = fpc * n_h as f64 / (n_h as f64 - 1.0);

        for total in &members {
            for j in 0..q {
                let dj = total[j] - centre[j];
                for k in 0..q {
                    meat[(j, k)] += factor * dj * (total[k] - centre[k]);
                }
            }
        }
    }

    if singletons > 0 {
        log::warn!("{singletons} strata contain a single PSU and contribute no variance");
    }
    meat
}

/// Linearization covariance B M B of a survey-weighted fit.
pub fn vcov_survey(bread: &Mat<f64>, scores: &Mat<f64>, design: &ResolvedDesign) -> Mat<f64> {
    sandwich_product(bread, &linearization_meat(scores, design))
}
