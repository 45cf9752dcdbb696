//! Nonparametric bootstrap covariance.

use crate::error::{Error, Result};
use faer::Mat;
use rand::Rng;

/// Resample observations with replacement `replicates` times, refit with
/// `refit`, and return the empirical covariance of the refitted parameters.
///
/// Replicates whose refit fails (e.g. a singular resample) are skipped; at
/// least two must succeed.
pub fn bootstrap_vcov<R, F>(n: usize, replicates: usize, rng: &mut R, mut refit: F) -> Result<Mat<f64>>
where
    R: Rng + ?Sized,
    F: FnMut(&[usize]) -> Result<Vec<f64>>,
{
    let mut draws: Vec<Vec<f64>> = Vec::with_capacity(replicates);
    let mut failed = 0usize;
    let mut rows = vec![0usize; n];

    for _ in 0..replicates {
        for row in rows.iter_mut() {
            *row = rng.gen_range(0..n);
        }
        match refit(&rows) {
            Ok(beta) if beta.iter().all(|b| b.is_finite()) => draws.push(beta),
            Ok(_) | Err(_) => failed += 1,
        }
    }

    if failed > 0 {
        log::debug!("bootstrap: {failed} of {replicates} replicates failed to refit");
    }
    if draws.len() < 2 {
        return Err(Error::BootstrapFailed {
            succeeded: draws.len(),
            requested: replicates,
        });
    }

    Ok(empirical_covariance(&draws))
}

/// Sample covariance (divisor B − 1) of the rows of `draws`.
pub fn empirical_covariance(draws: &[Vec<f64>]) -> Mat<f64> {
    let b = draws.len();
    let p = draws.first().map_or(0, Vec::len);
    let mut means = vec![0.0; p];
    for draw in draws {
        for (m, v) in means.iter_mut().zip(draw) {
            *m += v / b as f64;
        }
    }

    let mut cov = Mat::zeros(p, p);
    for draw in draws {
        for j in 0..p {
            let dj = draw[j] - means[j];
            for k in j..p {
                cov[(j, k)] += dj * (draw[k] - means[k]);
            }
        }
    }
    let divisor = (b.max(2) - 1) as f64;
    for j in 0..p {
        for k in j..p {
            cov[(j, k)] /= divisor;
            cov[(k, j)] = cov[(j, k)];
        }
    }
    cov
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_empirical_covariance() {
        let draws = vec![vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 10.0]];
        let cov = empirical_covariance(&draws);
        assert!((cov[(0, 0)] - 4.0).abs() < 1e-12);
        assert!((cov[(0, 1)] - 8.0).abs() < 1e-12);
        assert!((cov[(1, 1)] - 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_bootstrap_mean_variance() {
        // Bootstrap variance of a sample mean is close to s²/n
        let values: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let cov = bootstrap_vcov(values.len(), 400, &mut rng, |rows| {
            Ok(vec![rows.iter().map(|&r| values[r]).sum::<f64>() / rows.len() as f64])
        })
        .unwrap();

        let mean = values.iter().sum::<f64>() / 50.0;
        let s2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 50.0;
        let expected = s2 / 50.0;
        assert!((cov[(0, 0)] - expected).abs() < 0.35 * expected);
    }

    #[test]
    fn test_all_failures_reported() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = bootstrap_vcov(10, 5, &mut rng, |_| {
            Err(Error::InvalidData("singular".to_string()))
        });
        assert!(matches!(
            result,
            Err(Error::BootstrapFailed {
                succeeded: 0,
                requested: 5
            })
        ));
    }
}
