//! Matrix utility functions.

use crate::solvers::RegressionError;
use faer::{Col, Mat};

/// Compute the weighted cross-product X'WX.
///
/// When `weights` is `None` every observation has unit weight.
pub fn weighted_crossprod(x: &Mat<f64>, weights: Option<&[f64]>) -> Mat<f64> {
    let n_samples = x.nrows();
    let n_params = x.ncols();
    let mut xtwx = Mat::zeros(n_params, n_params);

    for i in 0..n_samples {
        let w = weights.map_or(1.0, |w| w[i]);
        if w == 0.0 {
            continue;
        }
        for j in 0..n_params {
            let xij = w * x[(i, j)];
            for k in j..n_params {
                xtwx[(j, k)] += xij * x[(i, k)];
            }
        }
    }

    for j in 0..n_params {
        for k in 0..j {
            xtwx[(j, k)] = xtwx[(k, j)];
        }
    }

    xtwx
}

/// Lower-triangular Cholesky factor L with A = LL'.
///
/// Returns `None` if A is not (numerically) positive definite.
pub fn cholesky(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    let mut l: Mat<f64> = Mat::zeros(n, n);

    for j in 0..n {
        let mut sum = 0.0;
        for k in 0..j {
            sum += l[(j, k)] * l[(j, k)];
        }
        let diag = a[(j, j)] - sum;
        if !diag.is_finite() || diag <= 0.0 {
            return None;
        }
        l[(j, j)] = diag.sqrt();

        for i in (j + 1)..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = (a[(i, j)] - sum) / l[(j, j)];
        }
    }

    Some(l)
}

/// Cholesky factor of a covariance matrix that may only be positive semi-definite.
///
/// Adds an escalating ridge to the diagonal (relative to the mean diagonal)
/// until the factorization succeeds.
pub fn cholesky_with_jitter(a: &Mat<f64>) -> Result<Mat<f64>, RegressionError> {
    if let Some(l) = cholesky(a) {
        return Ok(l);
    }

    let n = a.nrows();
    let mean_diag = (0..n).map(|i| a[(i, i)].abs()).sum::<f64>() / n.max(1) as f64;
    let base = if mean_diag > 0.0 { mean_diag } else { 1.0 };

    let mut jitter = base * 1e-12;
    while jitter < base * 1e-2 {
        let mut adjusted = a.clone();
        for i in 0..n {
            adjusted[(i, i)] += jitter;
        }
        if let Some(l) = cholesky(&adjusted) {
            log::debug!("covariance factorized with diagonal jitter {jitter:.3e}");
            return Ok(l);
        }
        jitter *= 10.0;
    }

    Err(RegressionError::NotPositiveDefinite)
}

/// Invert a symmetric positive definite matrix via its Cholesky factor.
pub fn invert_spd(a: &Mat<f64>) -> Result<Mat<f64>, RegressionError> {
    let n = a.nrows();
    let l = cholesky(a).ok_or(RegressionError::SingularMatrix)?;

    // Solve L L' X = I column by column
    let mut inverse: Mat<f64> = Mat::zeros(n, n);
    for col in 0..n {
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = if i == col { 1.0 } else { 0.0 };
            for k in 0..i {
                sum -= l[(i, k)] * y[k];
            }
            y[i] = sum / l[(i, i)];
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n {
                sum -= l[(k, i)] * x[k];
            }
            x[i] = sum / l[(i, i)];
        }

        for i in 0..n {
            inverse[(i, col)] = x[i];
        }
    }

    // Symmetrize to remove round-off asymmetry
    for i in 0..n {
        for j in 0..i {
            let avg = 0.5 * (inverse[(i, j)] + inverse[(j, i)]);
            inverse[(i, j)] = avg;
            inverse[(j, i)] = avg;
        }
    }

    Ok(inverse)
}

/// Solve the weighted least squares problem min Σ wᵢ (zᵢ - xᵢ'β)².
///
/// Uses QR decomposition with column pivoting on √W X. A rank-deficient
/// design is rejected rather than aliased.
pub fn solve_weighted_least_squares(
    x: &Mat<f64>,
    z: &[f64],
    weights: Option<&[f64]>,
    rank_tolerance: f64,
) -> Result<Col<f64>, RegressionError> {
    let n_samples = x.nrows();
    let n_params = x.ncols();

    if n_samples < n_params {
        return Err(RegressionError::InsufficientObservations {
            needed: n_params,
            got: n_samples,
        });
    }

    let mut x_weighted = Mat::zeros(n_samples, n_params);
    let mut z_weighted = Col::zeros(n_samples);

    for i in 0..n_samples {
        let sqrt_w = weights.map_or(1.0, |w| w[i].sqrt());
        for j in 0..n_params {
            x_weighted[(i, j)] = sqrt_w * x[(i, j)];
        }
        z_weighted[i] = sqrt_w * z[i];
    }

    let qr = x_weighted.col_piv_qr();
    let q = qr.compute_Q();
    let r = qr.R();
    let perm = qr.P();

    let scale = (0..n_params)
        .map(|i| r[(i, i)].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    for i in 0..n_params {
        if r[(i, i)].abs() <= rank_tolerance * scale {
            return Err(RegressionError::SingularMatrix);
        }
    }

    let qtz = q.transpose() * z_weighted;

    let mut beta_perm = Col::zeros(n_params);
    for i in (0..n_params).rev() {
        let mut sum = qtz[i];
        for j in (i + 1)..n_params {
            sum -= r[(i, j)] * beta_perm[j];
        }
        beta_perm[i] = sum / r[(i, i)];
    }

    let mut beta = Col::zeros(n_params);
    for i in 0..n_params {
        beta[perm.arrays().0[i]] = beta_perm[i];
    }

    Ok(beta)
}

/// Compute the linear predictor Xβ.
pub fn linear_predictor(x: &Mat<f64>, beta: &[f64]) -> Vec<f64> {
    (0..x.nrows())
        .map(|i| (0..x.ncols()).map(|j| x[(i, j)] * beta[j]).sum())
        .collect()
}

/// Simple matrix multiplication (A × B).
pub fn mat_mul(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    let m = a.nrows();
    let n = b.ncols();
    let k = a.ncols();
    let mut result = Mat::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[(i, l)] * b[(l, j)];
            }
            result[(i, j)] = sum;
        }
    }
    result
}

/// Sandwich product A × M × A for symmetric A.
pub fn sandwich_product(bread: &Mat<f64>, meat: &Mat<f64>) -> Mat<f64> {
    let temp = mat_mul(bread, meat);
    let mut result = mat_mul(&temp, bread);
    let n = result.nrows();
    for i in 0..n {
        for j in 0..i {
            let avg = 0.5 * (result[(i, j)] + result[(j, i)]);
            result[(i, j)] = avg;
            result[(j, i)] = avg;
        }
    }
    result
}

/// Diagonal of the hat matrix H = W^½ X B X' W^½, i.e. hᵢ = wᵢ xᵢ'B xᵢ.
pub fn hat_diagonal(x: &Mat<f64>, bread: &Mat<f64>, weights: Option<&[f64]>) -> Vec<f64> {
    let p = x.ncols();
    (0..x.nrows())
        .map(|i| {
            let w = weights.map_or(1.0, |w| w[i]);
            if w == 0.0 {
                return 0.0;
            }
            let mut quad = 0.0;
            for j in 0..p {
                let mut bx = 0.0;
                for k in 0..p {
                    bx += bread[(j, k)] * x[(i, k)];
                }
                quad += x[(i, j)] * bx;
            }
            w * quad
        })
        .collect()
}

/// Scale row i of X by `factors[i]`.
pub fn scale_rows(x: &Mat<f64>, factors: &[f64]) -> Mat<f64> {
    Mat::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] * factors[i])
}

/// Extract the rows and columns listed in `indices`.
pub fn select_square(a: &Mat<f64>, indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(indices.len(), indices.len(), |i, j| {
        a[(indices[i], indices[j])]
    })
}

/// Scale every entry of a matrix.
pub fn scale_matrix(a: &Mat<f64>, factor: f64) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] * factor)
}
