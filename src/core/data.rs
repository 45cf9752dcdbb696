//! In-memory tabular data.
//!
//! A [`DataFrame`] is an ordered set of named, typed columns of equal length.
//! Missing values are `NaN` for numeric columns and `None` elsewhere.
//!
//! # Example
//!
//! ```
//! use simreg_rs::core::DataFrame;
//!
//! let data = DataFrame::new()
//!     .with_numeric("mpg", vec![21.0, 22.8, 18.7])
//!     .with_text("cyl", vec!["six", "four", "eight"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(data.n_rows(), 3);
//! ```

use crate::error::{Error, Result};
use std::collections::HashMap;

/// A categorical column: integer codes into an ordered level set.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    levels: Vec<String>,
    codes: Vec<Option<usize>>,
}

impl Factor {
    /// Build a factor from text values. Levels are sorted, as R's `factor()` does.
    pub fn from_values<S: AsRef<str>>(values: &[Option<S>]) -> Self {
        let mut levels: Vec<String> = values
            .iter()
            .flatten()
            .map(|v| v.as_ref().to_string())
            .collect();
        levels.sort();
        levels.dedup();

        let index: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let codes = values
            .iter()
            .map(|v| v.as_ref().map(|s| index[s.as_ref()]))
            .collect();

        Self { levels, codes }
    }

    /// Build a factor with an explicit level order.
    ///
    /// Values outside `levels` are rejected.
    pub fn with_levels<S: AsRef<str>>(values: &[Option<S>], levels: Vec<String>) -> Result<Self> {
        let codes = values
            .iter()
            .map(|v| match v {
                None => Ok(None),
                Some(s) => levels
                    .iter()
                    .position(|l| l == s.as_ref())
                    .map(Some)
                    .ok_or_else(|| {
                        Error::InvalidData(format!(
                            "value `{}` is not among the declared levels",
                            s.as_ref()
                        ))
                    }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { levels, codes })
    }

    /// Ordered level labels.
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Per-row level codes (`None` = missing).
    pub fn codes(&self) -> &[Option<usize>] {
        &self.codes
    }

    /// Label of row `i`.
    pub fn label(&self, i: usize) -> Option<&str> {
        self.codes[i].map(|c| self.levels[c].as_str())
    }

    /// Most frequent level; ties go to the level encountered first in row order.
    pub fn mode(&self) -> Option<&str> {
        let mut counts = vec![0usize; self.levels.len()];
        let mut first_seen = vec![usize::MAX; self.levels.len()];
        for (row, code) in self.codes.iter().enumerate() {
            if let Some(c) = *code {
                counts[c] += 1;
                if first_seen[c] == usize::MAX {
                    first_seen[c] = row;
                }
            }
        }
        (0..self.levels.len())
            .filter(|&c| counts[c] > 0)
            .max_by(|&a, &b| counts[a].cmp(&counts[b]).then(first_seen[b].cmp(&first_seen[a])))
            .map(|c| self.levels[c].as_str())
    }

    /// The same factor restricted to levels that occur, in their original order.
    pub fn drop_unused_levels(&self) -> Self {
        let mut used = vec![false; self.levels.len()];
        for c in self.codes.iter().flatten() {
            used[*c] = true;
        }
        let mut remap = vec![0usize; self.levels.len()];
        let mut levels = Vec::new();
        for (i, level) in self.levels.iter().enumerate() {
            if used[i] {
                remap[i] = levels.len();
                levels.push(level.clone());
            }
        }
        Self {
            levels,
            codes: self.codes.iter().map(|c| c.map(|c| remap[c])).collect(),
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        Self {
            levels: self.levels.clone(),
            codes: rows.iter().map(|&r| self.codes[r]).collect(),
        }
    }
}

/// A typed column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Real-valued column; `NaN` marks a missing value.
    Numeric(Vec<f64>),
    /// Free text; converted to [`Column::Categorical`] at estimation time.
    Text(Vec<Option<String>>),
    /// Leveled categorical column.
    Categorical(Factor),
    /// Logical column.
    Boolean(Vec<Option<bool>>),
}

impl Column {
    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Categorical(f) => f.codes.len(),
            Column::Boolean(v) => v.len(),
        }
    }

    /// Returns true if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether row `i` is missing.
    pub fn is_missing(&self, i: usize) -> bool {
        match self {
            Column::Numeric(v) => v[i].is_nan(),
            Column::Text(v) => v[i].is_none(),
            Column::Categorical(f) => f.codes[i].is_none(),
            Column::Boolean(v) => v[i].is_none(),
        }
    }

    /// Whether the column holds numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Text(_) => "text",
            Column::Categorical(_) => "categorical",
            Column::Boolean(_) => "boolean",
        }
    }

    /// Text label of row `i`, for grouping variables (clusters, strata, PSUs).
    pub fn label(&self, i: usize) -> Option<String> {
        match self {
            Column::Numeric(v) => (!v[i].is_nan()).then(|| format!("{}", v[i])),
            Column::Text(v) => v[i].clone(),
            Column::Categorical(f) => f.label(i).map(str::to_string),
            Column::Boolean(v) => v[i].map(bool_label),
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&r| v[r].clone()).collect()),
            Column::Categorical(f) => Column::Categorical(f.take(rows)),
            Column::Boolean(v) => Column::Boolean(rows.iter().map(|&r| v[r]).collect()),
        }
    }
}

/// A single cell value, used to specify scenario covariates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// Text label of the value, for level matching.
    pub fn label(&self) -> String {
        match self {
            Value::Number(v) => format!("{v}"),
            Value::Text(s) => s.clone(),
            Value::Bool(b) => bool_label(*b),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Label used for boolean values, matching R's `TRUE`/`FALSE`.
pub fn bool_label(value: bool) -> String {
    if value { "TRUE" } else { "FALSE" }.to_string()
}

/// Ordered collection of equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl DataFrame {
    /// Start building a data frame.
    pub fn new() -> DataFrameBuilder {
        DataFrameBuilder::default()
    }

    /// Number of rows (0 for a frame without columns).
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Numeric values of a column, if it exists and is numeric.
    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// Add or replace a column.
    pub fn insert(&mut self, name: &str, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(Error::InvalidData(format!(
                "column `{name}` has {} rows, expected {}",
                column.len(),
                self.n_rows()
            )));
        }
        match self.names.iter().position(|n| n == name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name.to_string());
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Convert every text column to a leveled categorical column and drop
    /// levels no row uses from existing categorical columns.
    pub fn factorize(&self) -> DataFrame {
        let columns = self
            .columns
            .iter()
            .map(|c| match c {
                Column::Text(values) => Column::Categorical(Factor::from_values(values)),
                Column::Categorical(factor) => Column::Categorical(factor.drop_unused_levels()),
                other => other.clone(),
            })
            .collect();
        DataFrame {
            names: self.names.clone(),
            columns,
        }
    }

    /// Row indices with no missing value in any of `variables`.
    pub fn complete_cases(&self, variables: &[String]) -> Result<Vec<usize>> {
        let columns = variables
            .iter()
            .map(|v| {
                self.column(v).ok_or_else(|| {
                    Error::InvalidData(format!("column `{v}` not found in data"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.n_rows())
            .filter(|&i| columns.iter().all(|c| !c.is_missing(i)))
            .collect())
    }

    /// New frame containing only the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> DataFrame {
        DataFrame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }
}

/// Builder for [`DataFrame`].
#[derive(Debug, Clone, Default)]
pub struct DataFrameBuilder {
    columns: Vec<(String, Column)>,
}

impl DataFrameBuilder {
    /// Add a numeric column.
    pub fn with_numeric(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.push((name.to_string(), Column::Numeric(values)));
        self
    }

    /// Add a text column.
    pub fn with_text<S: AsRef<str>>(mut self, name: &str, values: Vec<S>) -> Self {
        let values = values
            .iter()
            .map(|v| Some(v.as_ref().to_string()))
            .collect();
        self.columns.push((name.to_string(), Column::Text(values)));
        self
    }

    /// Add a boolean column.
    pub fn with_bool(mut self, name: &str, values: Vec<bool>) -> Self {
        let values = values.into_iter().map(Some).collect();
        self.columns.push((name.to_string(), Column::Boolean(values)));
        self
    }

    /// Add an arbitrary column.
    pub fn with_column(mut self, name: &str, column: Column) -> Self {
        self.columns.push((name.to_string(), column));
        self
    }

    /// Validate lengths and unique names, then build.
    pub fn build(self) -> Result<DataFrame> {
        let mut frame = DataFrame::default();
        for (name, column) in self.columns {
            if frame.has_column(&name) {
                return Err(Error::InvalidData(format!("duplicate column `{name}`")));
            }
            frame.insert(&name, column)?;
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        DataFrame::new()
            .with_numeric("y", vec![1.0, f64::NAN, 3.0, 4.0])
            .with_text("g", vec!["b", "a", "b", "c"])
            .with_bool("flag", vec![true, false, true, true])
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_ragged_columns() {
        let result = DataFrame::new()
            .with_numeric("a", vec![1.0, 2.0])
            .with_numeric("b", vec![1.0])
            .build();
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_factorize_sorts_levels() {
        let data = sample().factorize();
        match data.column("g") {
            Some(Column::Categorical(f)) => {
                assert_eq!(f.levels(), &["a", "b", "c"]);
                assert_eq!(f.codes()[0], Some(1));
            }
            other => panic!("expected categorical, got {other:?}"),
        }
    }

    #[test]
    fn test_complete_cases() {
        let data = sample();
        let rows = data
            .complete_cases(&["y".to_string(), "g".to_string()])
            .unwrap();
        assert_eq!(rows, vec![0, 2, 3]);

        let subset = data.take_rows(&rows);
        assert_eq!(subset.n_rows(), 3);
        assert_eq!(subset.numeric("y").unwrap(), &[1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_complete_cases_unknown_column() {
        let data = sample();
        assert!(data.complete_cases(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_mode_ties_broken_by_first_occurrence() {
        let f = Factor::from_values(&[Some("z"), Some("a"), Some("a"), Some("z")]);
        // Both appear twice; "z" is encountered first
        assert_eq!(f.mode(), Some("z"));

        let f = Factor::from_values(&[Some("z"), Some("a"), Some("a")]);
        assert_eq!(f.mode(), Some("a"));
    }

    #[test]
    fn test_drop_unused_levels_keeps_order() {
        let levels = vec!["low".to_string(), "mid".to_string(), "high".to_string()];
        let f = Factor::with_levels(&[Some("high"), None, Some("low")], levels).unwrap();
        let dropped = f.drop_unused_levels();
        assert_eq!(dropped.levels(), &["low", "high"]);
        assert_eq!(dropped.codes(), &[Some(1), None, Some(0)]);
    }

    #[test]
    fn test_with_levels_rejects_unknown() {
        let result = Factor::with_levels(&[Some("x")], vec!["a".to_string()]);
        assert!(result.is_err());
    }
}
