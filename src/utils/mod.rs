//! Numerical helpers shared across the crate.

mod matrix;
mod stats;

pub use matrix::{
    cholesky, cholesky_with_jitter, hat_diagonal, invert_spd, linear_predictor, mat_mul,
    sandwich_product, scale_matrix, scale_rows, select_square, solve_weighted_least_squares,
    weighted_crossprod,
};
pub use stats::{mean, median, quantile, quantile_sorted, std_dev};
