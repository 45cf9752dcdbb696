//! Monte Carlo simulation of quantities of interest.

use super::fitted::ModelCore;
use super::scenario::Scenario;
use crate::error::{Error, Result};
use crate::models::Category;
use crate::utils::{mean, quantile_sorted, std_dev};
use faer::Mat;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;

/// Simulated values of one quantity.
///
/// A point scenario gives one value per draw; a range scenario gives a
/// `num × k` matrix with one column per range value.
#[derive(Debug, Clone, PartialEq)]
pub enum Draws {
    Point(Vec<f64>),
    Range { values: Mat<f64>, labels: Vec<String> },
}

impl Draws {
    fn from_columns(columns: Vec<Vec<f64>>, scenario: &Scenario) -> Self {
        if !scenario.is_range() {
            return Draws::Point(columns.into_iter().next().unwrap_or_default());
        }
        let num = columns.first().map_or(0, Vec::len);
        Draws::Range {
            values: Mat::from_fn(num, columns.len(), |d, j| columns[j][d]),
            labels: scenario.labels().to_vec(),
        }
    }

    /// Number of draws.
    pub fn num(&self) -> usize {
        match self {
            Draws::Point(v) => v.len(),
            Draws::Range { values, .. } => values.nrows(),
        }
    }

    pub fn n_columns(&self) -> usize {
        match self {
            Draws::Point(_) => 1,
            Draws::Range { values, .. } => values.ncols(),
        }
    }

    /// `(num, n_columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num(), self.n_columns())
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Draws::Range { .. })
    }

    /// Column labels of a range.
    pub fn labels(&self) -> Option<&[String]> {
        match self {
            Draws::Point(_) => None,
            Draws::Range { labels, .. } => Some(labels),
        }
    }

    /// Draws of column `j` (the only column of a point quantity is 0).
    pub fn column(&self, j: usize) -> Vec<f64> {
        match self {
            Draws::Point(v) => v.clone(),
            Draws::Range { values, .. } => (0..values.nrows()).map(|d| values[(d, j)]).collect(),
        }
    }

    /// Every value, column by column.
    pub fn values(&self) -> Vec<f64> {
        (0..self.n_columns()).flat_map(|j| self.column(j)).collect()
    }

    /// Mean of every column, skipping non-finite draws.
    pub fn column_means(&self) -> Vec<f64> {
        (0..self.n_columns())
            .map(|j| {
                let finite: Vec<f64> = self.column(j).into_iter().filter(|v| v.is_finite()).collect();
                mean(&finite)
            })
            .collect()
    }

    /// Elementwise `op(self, other)`, broadcasting a point quantity across
    /// the columns of a range.
    fn combine(&self, other: &Draws, op: impl Fn(f64, f64) -> f64) -> Result<Draws> {
        let k = match (self, other) {
            (Draws::Point(_), Draws::Point(_)) => {
                let (a, b) = (self.column(0), other.column(0));
                return Ok(Draws::Point(a.iter().zip(&b).map(|(&x, &y)| op(x, y)).collect()));
            }
            (Draws::Range { values: a, .. }, Draws::Range { values: b, .. }) => {
                if a.ncols() != b.ncols() {
                    return Err(Error::ScenarioShapeMismatch {
                        primary: a.ncols(),
                        contrast: b.ncols(),
                    });
                }
                a.ncols()
            }
            _ => self.n_columns().max(other.n_columns()),
        };

        let labels = self
            .labels()
            .or_else(|| other.labels())
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let at = |d: &Draws, row: usize, j: usize| match d {
            Draws::Point(v) => v[row],
            Draws::Range { values, .. } => values[(row, j)],
        };
        let num = self.num().min(other.num());
        Ok(Draws::Range {
            values: Mat::from_fn(num, k, |row, j| op(at(self, row, j), at(other, row, j))),
            labels,
        })
    }
}

/// Result of one `sim` call.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub ev: Draws,
    pub pv: Draws,
    pub ev1: Option<Draws>,
    pub pv1: Option<Draws>,
    /// ev1 − ev.
    pub fd: Option<Draws>,
    /// ev1 / ev, for binary and count outcomes.
    pub rr: Option<Draws>,
    pub num: usize,
    pub category: Category,
    pub scenario: Arc<Scenario>,
    pub scenario1: Option<Arc<Scenario>>,
}

fn check_shapes(primary: &Scenario, contrast: Option<&Scenario>) -> Result<()> {
    match contrast {
        Some(c) if primary.is_range() && c.is_range() && primary.n_rows() != c.n_rows() => {
            Err(Error::ScenarioShapeMismatch {
                primary: primary.n_rows(),
                contrast: c.n_rows(),
            })
        }
        _ => Ok(()),
    }
}

fn evaluate(
    core: &ModelCore,
    params: &Mat<f64>,
    scenario: &Scenario,
    rng: &mut dyn RngCore,
) -> (Draws, Draws) {
    let mut ev = Vec::with_capacity(scenario.n_rows());
    let mut pv = Vec::with_capacity(scenario.n_rows());
    for r in 0..scenario.n_rows() {
        let qoi = core.model.quantities_of_interest(
            params,
            &scenario.row(r),
            &core.fit,
            scenario.fe_offsets()[r],
            rng,
        );
        ev.push(qoi.ev);
        pv.push(qoi.pv);
    }
    (Draws::from_columns(ev, scenario), Draws::from_columns(pv, scenario))
}

pub(crate) fn run(
    core: &ModelCore,
    scenario: Arc<Scenario>,
    scenario1: Option<Arc<Scenario>>,
    num: usize,
    rng: &mut dyn RngCore,
) -> Result<SimulationOutput> {
    check_shapes(&scenario, scenario1.as_deref())?;

    // One set of parameter draws feeds both scenarios
    let params = core
        .model
        .draw_parameters(&core.fit.coefficients, &core.vcov, num, rng)?;
    let (ev, pv) = evaluate(core, &params, &scenario, rng);

    let category = core.model.category();
    let (ev1, pv1, fd, rr) = match &scenario1 {
        Some(contrast) => {
            let (ev1, pv1) = evaluate(core, &params, contrast, rng);
            let fd = ev.combine(&ev1, |a, b| b - a)?;
            let rr = if category.has_risk_ratio() {
                Some(ev.combine(&ev1, |a, b| b / a)?)
            } else {
                None
            };
            (Some(ev1), Some(pv1), Some(fd), rr)
        }
        None => (None, None, None, None),
    };

    log::debug!(
        "simulated {num} draws for {} scenario row(s){}",
        scenario.n_rows(),
        if scenario1.is_some() { " with contrast" } else { "" }
    );

    Ok(SimulationOutput {
        ev,
        pv,
        ev1,
        pv1,
        fd,
        rr,
        num,
        category,
        scenario,
        scenario1,
    })
}

/// Summary statistics of one quantity at one scenario column.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitySummary {
    /// `"ev"`, `"pv"`, `"ev1"`, `"pv1"`, `"fd"` or `"rr"`.
    pub quantity: &'static str,
    pub label: Option<String>,
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

/// Summaries of every simulated quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSummary {
    pub level: f64,
    pub rows: Vec<QuantitySummary>,
}

impl SimulationSummary {
    /// Rows of one quantity.
    pub fn quantity(&self, name: &str) -> Vec<&QuantitySummary> {
        self.rows.iter().filter(|r| r.quantity == name).collect()
    }
}

impl SimulationOutput {
    /// Mean, standard deviation, and the central `level` interval with
    /// median for every quantity and scenario column. Non-finite draws are
    /// ignored.
    pub fn summarize(&self, level: f64) -> SimulationSummary {
        let tail = (1.0 - level.clamp(0.0, 1.0)) / 2.0;
        let quantities = [
            ("ev", Some(&self.ev)),
            ("pv", Some(&self.pv)),
            ("ev1", self.ev1.as_ref()),
            ("pv1", self.pv1.as_ref()),
            ("fd", self.fd.as_ref()),
            ("rr", self.rr.as_ref()),
        ];

        let mut rows = Vec::new();
        for (name, draws) in quantities {
            let Some(draws) = draws else { continue };
            for j in 0..draws.n_columns() {
                let mut values: Vec<f64> =
                    draws.column(j).into_iter().filter(|v| v.is_finite()).collect();
                values.sort_by(f64::total_cmp);
                rows.push(QuantitySummary {
                    quantity: name,
                    label: draws.labels().map(|l| l[j].clone()),
                    mean: mean(&values),
                    sd: std_dev(&values),
                    lower: quantile_sorted(&values, tail),
                    median: quantile_sorted(&values, 0.5),
                    upper: quantile_sorted(&values, 1.0 - tail),
                });
            }
        }
        SimulationSummary { level, rows }
    }

    /// [`summarize`](Self::summarize) at the 95% level.
    pub fn summary(&self) -> SimulationSummary {
        self.summarize(0.95)
    }
}

impl fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = format!("{:.1}%", 100.0 * (1.0 - self.level) / 2.0);
        let hi = format!("{:.1}%", 100.0 * (1.0 + self.level) / 2.0);
        writeln!(
            f,
            "{:<5} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "", "", "mean", "sd", lo, "50%", hi
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<5} {:>12} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
                row.quantity,
                row.label.as_deref().unwrap_or(""),
                row.mean,
                row.sd,
                row.lower,
                row.median,
                row.upper
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(values: Vec<Vec<f64>>, labels: &[&str]) -> Draws {
        let num = values[0].len();
        Draws::Range {
            values: Mat::from_fn(num, values.len(), |d, j| values[j][d]),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_point_difference() {
        let a = Draws::Point(vec![1.0, 2.0]);
        let b = Draws::Point(vec![4.0, 4.0]);
        assert_eq!(a.combine(&b, |x, y| y - x).unwrap(), Draws::Point(vec![3.0, 2.0]));
    }

    #[test]
    fn test_point_broadcasts_over_range() {
        let point = Draws::Point(vec![1.0, 2.0]);
        let r = range(vec![vec![5.0, 6.0], vec![7.0, 8.0]], &["lo", "hi"]);
        let fd = point.combine(&r, |x, y| y - x).unwrap();
        assert_eq!(fd.shape(), (2, 2));
        assert_eq!(fd.column(1), vec![6.0, 6.0]);
        assert_eq!(fd.labels().unwrap(), &["lo".to_string(), "hi".to_string()]);
    }

    #[test]
    fn test_range_length_mismatch() {
        let a = range(vec![vec![1.0], vec![2.0]], &["a", "b"]);
        let b = range(vec![vec![1.0], vec![2.0], vec![3.0]], &["a", "b", "c"]);
        assert!(matches!(
            a.combine(&b, |x, y| y - x),
            Err(Error::ScenarioShapeMismatch {
                primary: 2,
                contrast: 3
            })
        ));
    }

    #[test]
    fn test_column_means_skip_nan() {
        let d = Draws::Point(vec![1.0, f64::NAN, 3.0]);
        assert_eq!(d.column_means(), vec![2.0]);
    }
}
