//! Core types: data, formulas, design matrices, GLM families and options.

mod data;
mod design;
mod family;
mod formula;
mod link;
mod options;

pub use data::{bool_label, Column, DataFrame, DataFrameBuilder, Factor, Value};
pub use design::{
    build_design_matrix, cell_value, response_vector, DesignSpec, Term, TermKind, INTERCEPT,
};
pub use family::{
    BinomialFamily, GammaFamily, GaussianFamily, GlmFamily, NegativeBinomialFamily, PoissonFamily,
};
pub use formula::{Formula, FIXED_EFFECTS_SEPARATOR};
pub use link::{standard_normal_cdf, standard_normal_pdf, Link};
pub use options::{
    ClusterSpec, EstimationOptions, EstimationOptionsBuilder, FixefSpec, HcType, OptionsError,
    VcovType, WeightSpec,
};
