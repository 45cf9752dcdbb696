//! Scenario construction for `setx` / `setx1`.

use super::fitted::{Extension, ModelCore};
use crate::core::{cell_value, Column, DataFrame, Factor, Value};
use crate::error::{Error, Result};
use crate::models::fixed_effects::fe_contribution;
use crate::utils::median;
use faer::Mat;
use std::collections::HashMap;

/// Summary applied to numeric predictors that are not set explicitly.
pub type DefaultFn = fn(&[f64]) -> f64;

/// Covariate values requested for a scenario.
///
/// ```
/// use simreg_rs::workflow::ScenarioSpec;
///
/// let spec = ScenarioSpec::new()
///     .set("wt", 3.0)
///     .range("hp", [100.0, 150.0, 200.0]);
/// assert_eq!(spec.overrides().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScenarioSpec {
    values: Vec<(String, Vec<Value>)>,
    default_fn: Option<DefaultFn>,
}

impl ScenarioSpec {
    /// A scenario holding every predictor at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix `name` at a single value.
    pub fn set(self, name: &str, value: impl Into<Value>) -> Self {
        self.with_values(name, vec![value.into()])
    }

    /// Vary `name` over `values`, in order.
    pub fn range<V: Into<Value>>(self, name: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.with_values(name, values.into_iter().map(Into::into).collect())
    }

    /// Summary for numeric predictors that are not set (default: median).
    pub fn default_fn(mut self, f: DefaultFn) -> Self {
        self.default_fn = Some(f);
        self
    }

    pub fn overrides(&self) -> &[(String, Vec<Value>)] {
        &self.values
    }

    fn with_values(mut self, name: &str, values: Vec<Value>) -> Self {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = values,
            None => self.values.push((name.to_string(), values)),
        }
        self
    }
}

/// Design rows for a covariate profile, or for one profile per value of a
/// single varying covariate.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    x: Mat<f64>,
    column_names: Vec<String>,
    range_variable: Option<String>,
    range_values: Vec<Value>,
    labels: Vec<String>,
    fe_offsets: Vec<f64>,
}

impl Scenario {
    /// Design matrix, one row per scenario row.
    pub fn x_matrix(&self) -> &Mat<f64> {
        &self.x
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_range(&self) -> bool {
        self.range_variable.is_some()
    }

    pub fn range_variable(&self) -> Option<&str> {
        self.range_variable.as_deref()
    }

    pub fn range_values(&self) -> &[Value] {
        &self.range_values
    }

    /// Axis labels of a range scenario, in input order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Fixed-effect offset of the first row (the only row of a point scenario).
    pub fn fe_contribution(&self) -> f64 {
        self.fe_offsets.first().copied().unwrap_or(0.0)
    }

    /// Fixed-effect offset of every row; differs between rows only when the
    /// range runs over a fixed-effect variable.
    pub fn fe_offsets(&self) -> &[f64] {
        &self.fe_offsets
    }

    pub(crate) fn row(&self, i: usize) -> Vec<f64> {
        (0..self.x.ncols()).map(|j| self.x[(i, j)]).collect()
    }
}

pub(crate) fn build(core: &ModelCore, spec: &ScenarioSpec) -> Result<Scenario> {
    let predictors: Vec<&str> = core.design.terms().iter().map(|t| t.variable.as_str()).collect();
    let fe_variables: &[String] = match &core.extension {
        Extension::FixedEffects(info) => &info.variables,
        _ => &[],
    };

    for (name, values) in spec.overrides() {
        if !predictors.contains(&name.as_str()) && !fe_variables.contains(name) {
            return Err(Error::UnknownCovariate(name.clone()));
        }
        if values.is_empty() {
            return Err(Error::InvalidData(format!("no value given for `{name}`")));
        }
    }

    let ranges: Vec<String> = spec
        .overrides()
        .iter()
        .filter(|(_, v)| v.len() > 1)
        .map(|(n, _)| n.clone())
        .collect();
    if ranges.len() > 1 {
        return Err(Error::MultipleRangeVariables(ranges));
    }
    let range = ranges.first().and_then(|name| {
        spec.overrides()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, v)| (n.clone(), v.clone()))
    });

    let mut base: HashMap<String, Value> = HashMap::new();
    for term in core.design.terms() {
        if spec.overrides().iter().any(|(n, _)| *n == term.variable) {
            continue;
        }
        let value = default_value(&core.data, &term.variable, spec.default_fn)?;
        base.insert(term.variable.clone(), value);
    }

    let n_rows = range.as_ref().map_or(1, |(_, v)| v.len());
    let p = core.design.n_columns();
    let mut x = Mat::zeros(n_rows, p);
    let mut fe_offsets = Vec::with_capacity(n_rows);
    let absorbed = core.fit.absorbed.as_ref();

    for r in 0..n_rows {
        let mut covariates = base.clone();
        let mut fe_levels: HashMap<String, Value> = HashMap::new();
        for (name, values) in spec.overrides() {
            let value = if values.len() > 1 { &values[r] } else { &values[0] };
            if fe_variables.contains(name) {
                fe_levels.insert(name.clone(), value.clone());
            } else {
                covariates.insert(name.clone(), value.clone());
            }
        }

        let row = core.design.row(&covariates)?;
        for (j, v) in row.into_iter().enumerate() {
            x[(r, j)] = v;
        }
        fe_offsets.push(fe_contribution(absorbed, &fe_levels));
    }

    let (range_variable, range_values) = match range {
        Some((name, values)) => (Some(name), values),
        None => (None, Vec::new()),
    };
    let labels = range_values.iter().map(Value::label).collect();

    Ok(Scenario {
        x,
        column_names: core.design.column_names().to_vec(),
        range_variable,
        range_values,
        labels,
        fe_offsets,
    })
}

/// Median (or `default_fn`) for numeric predictors, mode otherwise.
fn default_value(data: &DataFrame, variable: &str, default_fn: Option<DefaultFn>) -> Result<Value> {
    let column = data
        .column(variable)
        .ok_or_else(|| Error::UnknownCovariate(variable.to_string()))?;
    let missing = || Error::InvalidData(format!("`{variable}` has no observed values"));

    match column {
        Column::Numeric(values) => {
            let observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
            if observed.is_empty() {
                return Err(missing());
            }
            Ok(Value::Number(default_fn.map_or_else(|| median(&observed), |f| f(&observed))))
        }
        Column::Categorical(factor) => factor
            .mode()
            .map(|l| Value::Text(l.to_string()))
            .ok_or_else(missing),
        Column::Text(values) => Factor::from_values(values)
            .mode()
            .map(|l| Value::Text(l.to_string()))
            .ok_or_else(missing),
        Column::Boolean(_) => {
            let labels: Vec<Option<Value>> = (0..data.n_rows()).map(|i| cell_value(column, i)).collect();
            boolean_mode(&labels).ok_or_else(missing)
        }
    }
}

/// Most frequent boolean; ties go to the value seen first.
fn boolean_mode(values: &[Option<Value>]) -> Option<Value> {
    let mut counts = [0usize; 2];
    let mut first: Option<bool> = None;
    for value in values.iter().flatten() {
        if let Value::Bool(b) = value {
            counts[usize::from(*b)] += 1;
            first.get_or_insert(*b);
        }
    }
    let first = first?;
    let winner = match counts[1].cmp(&counts[0]) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => first,
    };
    Some(Value::Bool(winner))
}
