//! Survey-design resolution.
//!
//! Weights, PSU identifiers, strata and finite population corrections can be
//! supplied piecemeal to [`estimate`](crate::workflow::estimate) or bundled in
//! a [`SurveyDesign`]. [`resolve`] normalizes both into a single design that
//! refers to data columns; [`SurveyDesign::materialize`] turns it into
//! per-row codes once the estimation sample is fixed.

use crate::core::{Column, DataFrame, EstimationOptions, Formula, WeightSpec};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Name of the hidden column holding raw weight vectors.
pub const HIDDEN_WEIGHT_COLUMN: &str = ".survey_weights";

/// A survey design expressed as references to data columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyDesign {
    ids: Vec<String>,
    strata: Vec<String>,
    fpc: Option<String>,
    weights: Option<String>,
    nest: bool,
}

impl SurveyDesign {
    /// An unclustered, unstratified design with equal weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// PSU identifiers from a one-sided formula (`"~1"` for none).
    pub fn ids(mut self, formula: &str) -> Result<Self> {
        self.ids = Formula::one_sided_variables(formula)?;
        Ok(self)
    }

    /// Strata from a one-sided formula.
    pub fn strata(mut self, formula: &str) -> Result<Self> {
        self.strata = Formula::one_sided_variables(formula)?;
        Ok(self)
    }

    /// Finite population correction from a one-sided formula naming one column.
    pub fn fpc(mut self, formula: &str) -> Result<Self> {
        self.fpc = single_variable(formula, "fpc")?;
        Ok(self)
    }

    /// Weight column by name.
    pub fn weights(mut self, column: &str) -> Self {
        self.weights = Some(column.to_string());
        self
    }

    /// Treat PSU identifiers as unique only within strata.
    pub fn nest(mut self, nest: bool) -> Self {
        self.nest = nest;
        self
    }

    /// Weight column, if any.
    pub fn weight_column(&self) -> Option<&str> {
        self.weights.as_deref()
    }

    /// Whether PSUs are nested in strata.
    pub fn is_nested(&self) -> bool {
        self.nest
    }

    /// Every data column the design refers to.
    pub fn variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = self.ids.iter().chain(&self.strata).cloned().collect();
        vars.extend(self.fpc.iter().cloned());
        vars.extend(self.weights.iter().cloned());
        vars
    }

    /// Evaluate the design on the (complete-case) estimation data.
    pub fn materialize(&self, data: &DataFrame) -> Result<ResolvedDesign> {
        let n = data.n_rows();

        let weights = match &self.weights {
            Some(name) => {
                let values = data.numeric(name).ok_or_else(|| {
                    Error::InvalidWeightSpec(format!("weight column `{name}` is not numeric or does not exist"))
                })?;
                if values.iter().any(|&w| !w.is_finite() || w < 0.0) {
                    return Err(Error::InvalidWeightSpec(
                        "weights must be finite and non-negative".to_string(),
                    ));
                }
                values.to_vec()
            }
            None => vec![1.0; n],
        };

        let strata_labels = combined_labels(data, &self.strata)?;
        let (strata, n_strata) = encode(&strata_labels);

        let psu_labels = combined_labels(data, &self.ids)?;
        let psu_labels: Vec<String> = if self.ids.is_empty() {
            (0..n).map(|i| i.to_string()).collect()
        } else if self.nest {
            strata_labels
                .iter()
                .zip(&psu_labels)
                .map(|(s, c)| format!("{s}\u{1f}{c}"))
                .collect()
        } else {
            let mut home: HashMap<&str, &str> = HashMap::new();
            for (psu, stratum) in psu_labels.iter().zip(&strata_labels) {
                if let Some(previous) = home.insert(psu, stratum) {
                    if previous != stratum {
                        return Err(Error::InvalidSurveyDesign(format!(
                            "PSU `{psu}` appears in more than one stratum; use nest = true if PSU ids are reused across strata"
                        )));
                    }
                }
            }
            psu_labels
        };
        let (psu, n_psu) = encode(&psu_labels);

        let fpc = match &self.fpc {
            Some(name) => {
                let values = data.numeric(name).ok_or_else(|| {
                    Error::InvalidSurveyDesign(format!("fpc column `{name}` is not numeric or does not exist"))
                })?;
                Some(sampling_fractions(values, &strata, &psu, n_strata)?)
            }
            None => None,
        };

        Ok(ResolvedDesign {
            weights,
            strata,
            psu,
            sampling_fraction: fpc,
            n_strata,
            n_psu,
        })
    }
}

/// Per-row design codes for the estimation sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDesign {
    /// Sampling weight of every row.
    pub weights: Vec<f64>,
    /// Stratum code of every row.
    pub strata: Vec<usize>,
    /// PSU code of every row (unique across strata).
    pub psu: Vec<usize>,
    /// Sampling fraction of every stratum, when an fpc was given.
    pub sampling_fraction: Option<Vec<f64>>,
    pub n_strata: usize,
    pub n_psu: usize,
}

impl ResolvedDesign {
    /// Weights rescaled to mean one.
    pub fn normalized_weights(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().sum();
        let n = self.weights.len() as f64;
        if total > 0.0 {
            self.weights.iter().map(|w| w * n / total).collect()
        } else {
            self.weights.clone()
        }
    }
}

/// Normalize the survey-related options into a design, or `None` when no
/// survey adjustment was requested.
///
/// A raw weight vector is stored in [`HIDDEN_WEIGHT_COLUMN`] of `data` so that
/// it follows the rows through complete-case filtering.
pub fn resolve(data: &mut DataFrame, options: &EstimationOptions) -> Result<Option<SurveyDesign>> {
    if let Some(design) = &options.survey_design {
        return Ok(Some(design.clone()));
    }
    if options.weights.is_none()
        && options.ids.is_none()
        && options.strata.is_none()
        && options.fpc.is_none()
    {
        return Ok(None);
    }

    let mut design = SurveyDesign::new().nest(options.nest);
    if let Some(ids) = &options.ids {
        design = design.ids(ids)?;
    }
    if let Some(strata) = &options.strata {
        design = design.strata(strata)?;
    }
    if let Some(fpc) = &options.fpc {
        design = design.fpc(fpc)?;
    }
    if let Some(weights) = &options.weights {
        let column = weight_column(data, weights)?;
        design = design.weights(&column);
    }

    Ok(Some(design))
}

/// Resolve a weight specification to a numeric column of `data`.
pub fn weight_column(data: &mut DataFrame, weights: &WeightSpec) -> Result<String> {
    let name = match weights {
        WeightSpec::Values(values) => {
            if values.len() != data.n_rows() {
                return Err(Error::InvalidWeightSpec(format!(
                    "{} weights for {} rows",
                    values.len(),
                    data.n_rows()
                )));
            }
            data.insert(HIDDEN_WEIGHT_COLUMN, Column::Numeric(values.clone()))?;
            HIDDEN_WEIGHT_COLUMN.to_string()
        }
        WeightSpec::Column(name) => name.clone(),
        WeightSpec::Formula(formula) => single_variable(formula, "weights")?.ok_or_else(|| {
            Error::InvalidWeightSpec(format!("weight formula `{formula}` names no column"))
        })?,
    };

    match data.column(&name) {
        Some(Column::Numeric(_)) => Ok(name),
        Some(other) => Err(Error::InvalidWeightSpec(format!(
            "weight column `{name}` is {}, expected numeric",
            other.type_name()
        ))),
        None => Err(Error::InvalidWeightSpec(format!(
            "weight column `{name}` does not exist in data"
        ))),
    }
}

fn single_variable(formula: &str, what: &str) -> Result<Option<String>> {
    let mut vars = Formula::one_sided_variables(formula)?;
    match vars.len() {
        0 => Ok(None),
        1 => Ok(vars.pop()),
        _ => Err(Error::InvalidSurveyDesign(format!(
            "{what} formula `{formula}` must name a single column"
        ))),
    }
}

/// Row labels formed by joining the given columns; a single shared label
/// when `columns` is empty.
fn combined_labels(data: &DataFrame, columns: &[String]) -> Result<Vec<String>> {
    let n = data.n_rows();
    let mut labels = vec![String::new(); n];
    for name in columns {
        let column = data.column(name).ok_or_else(|| {
            Error::InvalidSurveyDesign(format!("design column `{name}` does not exist"))
        })?;
        for (i, label) in labels.iter_mut().enumerate() {
            let value = column.label(i).ok_or_else(|| {
                Error::InvalidSurveyDesign(format!("missing value in design column `{name}`"))
            })?;
            if !label.is_empty() {
                label.push('\u{1f}');
            }
            label.push_str(&value);
        }
    }
    Ok(labels)
}

/// Dense codes in order of first appearance.
fn encode(labels: &[String]) -> (Vec<usize>, usize) {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let codes = labels
        .iter()
        .map(|l| {
            let next = index.len();
            *index.entry(l.as_str()).or_insert(next)
        })
        .collect();
    (codes, index.len())
}

/// Per-stratum sampling fractions from an fpc column.
///
/// Values ≤ 1 are fractions; larger values are population PSU counts, giving
/// f = n_h / N_h.
fn sampling_fractions(
    fpc: &[f64],
    strata: &[usize],
    psu: &[usize],
    n_strata: usize,
) -> Result<Vec<f64>> {
    let mut value: Vec<Option<f64>> = vec![None; n_strata];
    let mut psus: Vec<Vec<usize>> = vec![Vec::new(); n_strata];

    for i in 0..fpc.len() {
        let h = strata[i];
        match value[h] {
            Some(v) if (v - fpc[i]).abs() > 1e-12 => {
                return Err(Error::InvalidSurveyDesign(
                    "fpc must be constant within strata".to_string(),
                ))
            }
            _ => value[h] = Some(fpc[i]),
        }
        if !psus[h].contains(&psu[i]) {
            psus[h].push(psu[i]);
        }
    }

    (0..n_strata)
        .map(|h| {
            let v = value[h].unwrap_or(0.0);
            let n_h = psus[h].len() as f64;
            let f = if v <= 1.0 { v } else { n_h / v };
            if !(0.0..=1.0).contains(&f) {
                return Err(Error::InvalidSurveyDesign(format!(
                    "fpc implies a sampling fraction of {f} in stratum {h}"
                )));
            }
            Ok(f)
        })
        .collect()
}
