//! Model-matrix construction from a formula and a data frame.
//!
//! Numeric predictors enter as-is, categorical predictors are dummy coded
//! with treatment contrasts (first level is the reference), and boolean
//! predictors become a single `nameTRUE` indicator.

use super::data::{Column, DataFrame, Factor, Value};
use super::formula::Formula;
use crate::error::{Error, Result};
use faer::Mat;
use std::collections::HashMap;

/// Name of the intercept column.
pub const INTERCEPT: &str = "(Intercept)";

/// How a predictor is encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Numeric,
    /// `full` means every level gets a column (no-intercept models).
    Factor { levels: Vec<String>, full: bool },
    Boolean,
}

/// One predictor of the linear part.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub variable: String,
    pub kind: TermKind,
}

impl Term {
    fn column_names(&self) -> Vec<String> {
        match &self.kind {
            TermKind::Numeric => vec![self.variable.clone()],
            TermKind::Factor { levels, full } => {
                let skip = usize::from(!*full);
                levels
                    .iter()
                    .skip(skip)
                    .map(|l| format!("{}{}", self.variable, l))
                    .collect()
            }
            TermKind::Boolean => vec![format!("{}TRUE", self.variable)],
        }
    }

    fn encode(&self, value: &Value, out: &mut Vec<f64>) -> Result<()> {
        match &self.kind {
            TermKind::Numeric => match value {
                Value::Number(v) => out.push(*v),
                other => {
                    return Err(Error::InvalidData(format!(
                        "`{}` is numeric, got `{}`",
                        self.variable,
                        other.label()
                    )))
                }
            },
            TermKind::Factor { levels, full } => {
                let label = value.label();
                let code = levels.iter().position(|l| *l == label).ok_or_else(|| {
                    Error::UnknownCategoricalLevel {
                        variable: self.variable.clone(),
                        level: label.clone(),
                        levels: levels.clone(),
                    }
                })?;
                let start = usize::from(!*full);
                for level in start..levels.len() {
                    out.push(if level == code { 1.0 } else { 0.0 });
                }
            }
            TermKind::Boolean => {
                let flag = match value {
                    Value::Bool(b) => *b,
                    Value::Number(v) if *v == 0.0 || *v == 1.0 => *v == 1.0,
                    Value::Text(s) if s == "TRUE" || s == "FALSE" => s == "TRUE",
                    other => {
                        return Err(Error::InvalidData(format!(
                            "`{}` is boolean, got `{}`",
                            self.variable,
                            other.label()
                        )))
                    }
                };
                out.push(if flag { 1.0 } else { 0.0 });
            }
        }
        Ok(())
    }
}

/// Encoding recipe for the linear part of a formula.
///
/// Built once from the estimation data, then reused to build model
/// matrices for resampled data and single rows for scenarios.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignSpec {
    intercept: bool,
    terms: Vec<Term>,
    column_names: Vec<String>,
}

impl DesignSpec {
    /// Derive the encoding of `formula`'s predictors from `data`.
    ///
    /// With `absorb_intercept` the intercept is dropped because fixed effects
    /// take its place; factors keep treatment contrasts in that case.
    pub fn new(formula: &Formula, data: &DataFrame, absorb_intercept: bool) -> Result<Self> {
        let intercept = formula.has_intercept() && !absorb_intercept;
        let mut full_coding_available = !formula.has_intercept() && !absorb_intercept;

        let mut terms = Vec::with_capacity(formula.terms().len());
        for variable in formula.terms() {
            let column = data.column(variable).ok_or_else(|| {
                Error::InvalidData(format!("predictor `{variable}` not found in data"))
            })?;
            let kind = match column {
                Column::Numeric(_) => TermKind::Numeric,
                Column::Boolean(_) => TermKind::Boolean,
                Column::Categorical(factor) => {
                    factor_kind(factor.levels().to_vec(), &mut full_coding_available)
                }
                Column::Text(values) => factor_kind(
                    Factor::from_values(values).levels().to_vec(),
                    &mut full_coding_available,
                ),
            };
            terms.push(Term {
                variable: variable.clone(),
                kind,
            });
        }

        let mut column_names = Vec::new();
        if intercept {
            column_names.push(INTERCEPT.to_string());
        }
        for term in &terms {
            column_names.extend(term.column_names());
        }

        Ok(Self {
            intercept,
            terms,
            column_names,
        })
    }

    /// Whether the design has an intercept column.
    pub fn has_intercept(&self) -> bool {
        self.intercept
    }

    /// Encoded predictors.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Design-matrix column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of design-matrix columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Levels of every categorical predictor.
    pub fn categorical_levels(&self) -> HashMap<String, Vec<String>> {
        self.terms
            .iter()
            .filter_map(|t| match &t.kind {
                TermKind::Factor { levels, .. } => Some((t.variable.clone(), levels.clone())),
                _ => None,
            })
            .collect()
    }

    /// Encode every row of `data`.
    pub fn model_matrix(&self, data: &DataFrame) -> Result<Mat<f64>> {
        let columns = self
            .terms
            .iter()
            .map(|t| {
                data.column(&t.variable).ok_or_else(|| {
                    Error::InvalidData(format!("predictor `{}` not found in data", t.variable))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let n = data.n_rows();
        let p = self.n_columns();
        let mut x = Mat::zeros(n, p);
        let mut row = Vec::with_capacity(p);

        for i in 0..n {
            row.clear();
            if self.intercept {
                row.push(1.0);
            }
            for (term, column) in self.terms.iter().zip(&columns) {
                let value = cell_value(column, i).ok_or_else(|| {
                    Error::InvalidData(format!("missing value in `{}` at row {i}", term.variable))
                })?;
                term.encode(&value, &mut row)?;
            }
            for (j, &v) in row.iter().enumerate() {
                x[(i, j)] = v;
            }
        }

        Ok(x)
    }

    /// Encode a single covariate profile; every predictor must be present.
    pub fn row(&self, values: &HashMap<String, Value>) -> Result<Vec<f64>> {
        let mut row = Vec::with_capacity(self.n_columns());
        if self.intercept {
            row.push(1.0);
        }
        for term in &self.terms {
            let value = values
                .get(&term.variable)
                .ok_or_else(|| Error::UnknownCovariate(term.variable.clone()))?;
            term.encode(value, &mut row)?;
        }
        Ok(row)
    }
}

fn factor_kind(levels: Vec<String>, full_coding_available: &mut bool) -> TermKind {
    let full = *full_coding_available;
    *full_coding_available = false;
    TermKind::Factor { levels, full }
}

/// Value of row `i` of a column, `None` when missing.
pub fn cell_value(column: &Column, i: usize) -> Option<Value> {
    match column {
        Column::Numeric(v) => (!v[i].is_nan()).then(|| Value::Number(v[i])),
        Column::Text(v) => v[i].clone().map(Value::Text),
        Column::Categorical(f) => f.label(i).map(|l| Value::Text(l.to_string())),
        Column::Boolean(v) => v[i].map(Value::Bool),
    }
}

/// Outcome vector of a two-sided formula.
pub fn response_vector(formula: &Formula, data: &DataFrame) -> Result<Vec<f64>> {
    let name = formula.response().ok_or_else(|| Error::InvalidFormula {
        formula: formula.to_string(),
        hint: "the model formula needs a response on the left of `~`".to_string(),
    })?;
    match data.column(name) {
        Some(Column::Numeric(v)) => Ok(v.clone()),
        Some(Column::Boolean(v)) => v
            .iter()
            .map(|b| b.map(|b| if b { 1.0 } else { 0.0 }).ok_or_else(|| missing_response(name)))
            .collect(),
        Some(other) => Err(Error::InvalidData(format!(
            "response `{name}` must be numeric or boolean, found {}",
            other.type_name()
        ))),
        None => Err(Error::InvalidData(format!("response `{name}` not found in data"))),
    }
}

fn missing_response(name: &str) -> Error {
    Error::InvalidData(format!("missing value in response `{name}`"))
}

/// Outcome vector, design matrix and column names for `formula` on `data`.
pub fn build_design_matrix(
    formula: &Formula,
    data: &DataFrame,
) -> Result<(Vec<f64>, Mat<f64>, Vec<String>)> {
    let spec = DesignSpec::new(formula, data, false)?;
    let y = response_vector(formula, data)?;
    let x = spec.model_matrix(data)?;
    Ok((y, x, spec.column_names().to_vec()))
}
