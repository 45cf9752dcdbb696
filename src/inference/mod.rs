//! Coefficient covariance estimators (sandwich, cluster, bootstrap, survey
//! linearization) and the dispatch that chooses between them.

mod bootstrap;
mod sandwich;
mod survey;
mod vcov;

pub use bootstrap::{bootstrap_vcov, empirical_covariance};
pub use sandwich::{cluster_meat, vcov_cluster, vcov_hc};
pub use survey::{linearization_meat, vcov_survey};
pub use vcov::{align_vcov, compute_vcov, resolve_cluster, VcovRequest};
