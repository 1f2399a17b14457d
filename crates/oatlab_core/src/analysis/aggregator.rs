//! Reduces the ledger to an outcome × run matrix for one statistic, and
//! derives relative deviations from the baseline column.
//!
//! Everything here is a pure function of its inputs. Color and the
//! absolute/relative toggle are layered on top by the caller.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::QuantityRef;

use super::{RunLedger, RunOutcome, RunPlan, Statistic};

/// One matrix cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Value(f64),
    /// The solver failed for this run
    Failed,
    /// Scheduled but not recorded yet, or the run did not measure this outcome
    NotRun,
    /// Reduction or deviation undefined (empty series, zero baseline)
    NotComputable,
}

impl Cell {
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueMode {
    #[default]
    Absolute,
    /// Percent deviation from the baseline column
    Relative,
}

/// Column header for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunColumn {
    pub index: usize,
    pub label: String,
    pub parameter: Option<QuantityRef>,
    pub recorded: bool,
    pub failed: bool,
}

impl RunColumn {
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        self.parameter.is_none()
    }
}

/// What to put in the matrix
#[derive(Debug, Clone, Copy)]
pub struct MatrixRequest<'a> {
    pub statistic: Statistic,
    /// Row order
    pub outcomes: &'a [QuantityRef],
    /// Runs perturbing these parameters are left out
    pub excluded_parameters: &'a [QuantityRef],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMatrix {
    pub statistic: Statistic,
    pub mode: ValueMode,
    pub outcomes: Vec<QuantityRef>,
    pub columns: Vec<RunColumn>,
    cells: Vec<Vec<Cell>>,
}

impl ValueMatrix {
    /// (rows, columns)
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.outcomes.len(), self.columns.len())
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[Cell]> {
        self.cells.get(row).map(Vec::as_slice)
    }

    /// Row for an outcome, by reference
    #[must_use]
    pub fn row_for(&self, outcome: &QuantityRef) -> Option<&[Cell]> {
        let row = self.outcomes.iter().position(|o| o == outcome)?;
        self.row(row)
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(column)).copied()
    }

    /// Baseline column position, if present
    #[must_use]
    pub fn baseline_column(&self) -> Option<usize> {
        self.columns.iter().position(RunColumn::is_baseline)
    }

    /// The baseline cell of every row
    #[must_use]
    pub fn baseline(&self) -> Vec<Cell> {
        match self.baseline_column() {
            Some(col) => self.cells.iter().map(|row| row[col]).collect(),
            None => vec![Cell::NotRun; self.outcomes.len()],
        }
    }
}

/// Reduce every (outcome, run) pair.
///
/// Columns come from `plan` when a sequence has been scheduled, so runs not
/// yet recorded show as [`Cell::NotRun`]; otherwise from the ledger itself.
/// The baseline column is never excluded.
#[must_use]
pub fn compute_matrix(
    ledger: &RunLedger,
    plan: Option<&RunPlan>,
    request: &MatrixRequest<'_>,
) -> ValueMatrix {
    let excluded = |parameter: Option<&QuantityRef>| {
        parameter.is_some_and(|p| request.excluded_parameters.contains(p))
    };

    let columns: Vec<RunColumn> = match plan {
        Some(plan) => plan
            .runs
            .iter()
            .filter(|scheduled| !excluded(scheduled.kind.parameter()))
            .map(|scheduled| {
                let run = ledger.get(scheduled.index);
                RunColumn {
                    index: scheduled.index,
                    label: scheduled.kind.label(),
                    parameter: scheduled.kind.parameter().cloned(),
                    recorded: run.is_some(),
                    failed: run.is_some_and(|r| r.is_failed()),
                }
            })
            .collect(),
        None => ledger
            .iter()
            .filter(|run| !excluded(run.kind.parameter()))
            .map(|run| RunColumn {
                index: run.index,
                label: run.kind.label(),
                parameter: run.kind.parameter().cloned(),
                recorded: true,
                failed: run.is_failed(),
            })
            .collect(),
    };

    let reduce_row = |outcome: &QuantityRef| -> Vec<Cell> {
        columns
            .iter()
            .map(|column| reduce_cell(ledger, column.index, outcome, request.statistic))
            .collect()
    };

    #[cfg(feature = "parallel")]
    let cells: Vec<Vec<Cell>> = request.outcomes.par_iter().map(reduce_row).collect();

    #[cfg(not(feature = "parallel"))]
    let cells: Vec<Vec<Cell>> = request.outcomes.iter().map(reduce_row).collect();

    ValueMatrix {
        statistic: request.statistic,
        mode: ValueMode::Absolute,
        outcomes: request.outcomes.to_vec(),
        columns,
        cells,
    }
}

fn reduce_cell(ledger: &RunLedger, index: usize, outcome: &QuantityRef, statistic: Statistic) -> Cell {
    let Some(run) = ledger.get(index) else {
        return Cell::NotRun;
    };
    match &run.outcome {
        RunOutcome::Failed(_) => Cell::Failed,
        RunOutcome::Solved(_) => match run.series(outcome) {
            None => Cell::NotRun,
            Some(series) => series
                .stats
                .map_or(Cell::NotComputable, |stats| Cell::Value(stats.get(statistic))),
        },
    }
}

/// `100 * (value - baseline) / baseline`, `None` when the baseline is zero
#[must_use]
pub fn deviation_percent(value: f64, baseline: f64) -> Option<f64> {
    if baseline == 0.0 {
        None
    } else {
        Some(100.0 * (value - baseline) / baseline)
    }
}

fn relative_cell(cell: Cell, baseline: Cell) -> Cell {
    match (cell, baseline) {
        (Cell::Value(v), Cell::Value(b)) => {
            deviation_percent(v, b).map_or(Cell::NotComputable, Cell::Value)
        }
        (Cell::Value(_), sentinel) => sentinel,
        (sentinel, _) => sentinel,
    }
}

/// Percent deviation of every cell from its row's baseline cell.
///
/// A value cell becomes [`Cell::NotComputable`] when its baseline cell is
/// zero. Sentinel cells keep their own state, and a sentinel baseline carries
/// over to the values of its row, so a value cell whose baseline is itself
/// `NotComputable` (an empty baseline series) is `NotComputable` as well.
#[must_use]
pub fn percent_deviation(matrix: &ValueMatrix) -> ValueMatrix {
    let baseline = matrix.baseline();
    let cells = matrix
        .cells
        .iter()
        .zip(&baseline)
        .map(|(row, &base)| row.iter().map(|&cell| relative_cell(cell, base)).collect())
        .collect();

    ValueMatrix {
        statistic: matrix.statistic,
        mode: ValueMode::Relative,
        outcomes: matrix.outcomes.clone(),
        columns: matrix.columns.clone(),
        cells,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::analysis::{OutcomeSeries, Run, RunKind};
    use crate::error::SolveFailure;
    use crate::model::Perturbation;

    fn r(text: &str) -> QuantityRef {
        text.parse().unwrap()
    }

    fn solved(index: usize, kind: RunKind, values: &[(&str, Vec<f64>)]) -> Run {
        Run {
            index,
            kind,
            outcome: RunOutcome::Solved(
                values
                    .iter()
                    .map(|(name, v)| OutcomeSeries::new(r(name), v.clone()))
                    .collect(),
            ),
            recorded_at: jiff::Timestamp::UNIX_EPOCH,
            solve_time: Duration::ZERO,
        }
    }

    fn perturbed(name: &str) -> RunKind {
        RunKind::Perturbed(Perturbation::new(r(name), 10.0))
    }

    fn ledger() -> RunLedger {
        let mut ledger = RunLedger::new();
        ledger
            .record(solved(
                0,
                RunKind::Baseline,
                &[("Profit", vec![10.0, 30.0]), ("Cost", vec![0.0, 0.0])],
            ))
            .unwrap();
        ledger
            .record(solved(
                1,
                perturbed("A"),
                &[("Profit", vec![20.0, 40.0]), ("Cost", vec![5.0, 5.0])],
            ))
            .unwrap();
        ledger
            .record(Run {
                index: 2,
                kind: perturbed("B"),
                outcome: RunOutcome::Failed(SolveFailure::Infeasible("bounds".into())),
                recorded_at: jiff::Timestamp::UNIX_EPOCH,
                solve_time: Duration::ZERO,
            })
            .unwrap();
        ledger
    }

    #[test]
    fn test_matrix_from_ledger() {
        let outcomes = [r("Profit"), r("Cost")];
        let matrix = compute_matrix(
            &ledger(),
            None,
            &MatrixRequest {
                statistic: Statistic::Mean,
                outcomes: &outcomes,
                excluded_parameters: &[],
            },
        );

        assert_eq!(matrix.shape(), (2, 3));
        assert_eq!(
            matrix.row(0).unwrap(),
            &[Cell::Value(20.0), Cell::Value(30.0), Cell::Failed]
        );
        assert_eq!(matrix.baseline(), vec![Cell::Value(20.0), Cell::Value(0.0)]);
        assert!(matrix.columns[2].failed);
    }

    #[test]
    fn test_excluded_parameters_are_omitted() {
        let outcomes = [r("Profit")];
        let excluded = [r("A")];
        let matrix = compute_matrix(
            &ledger(),
            None,
            &MatrixRequest {
                statistic: Statistic::Final,
                outcomes: &outcomes,
                excluded_parameters: &excluded,
            },
        );
        let labels: Vec<_> = matrix.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["Baseline", "B +10%"]);
        assert_eq!(matrix.row(0).unwrap(), &[Cell::Value(30.0), Cell::Failed]);
    }

    #[test]
    fn test_unknown_outcome_is_not_run() {
        let outcomes = [r("Revenue")];
        let matrix = compute_matrix(
            &ledger(),
            None,
            &MatrixRequest {
                statistic: Statistic::Mean,
                outcomes: &outcomes,
                excluded_parameters: &[],
            },
        );
        assert_eq!(
            matrix.row(0).unwrap(),
            &[Cell::NotRun, Cell::NotRun, Cell::Failed]
        );
    }

    #[test]
    fn test_relative_sentinels() {
        let outcomes = [r("Profit"), r("Cost")];
        let matrix = compute_matrix(
            &ledger(),
            None,
            &MatrixRequest {
                statistic: Statistic::Mean,
                outcomes: &outcomes,
                excluded_parameters: &[],
            },
        );
        let relative = percent_deviation(&matrix);
        assert_eq!(relative.mode, ValueMode::Relative);
        assert_eq!(
            relative.row(0).unwrap(),
            &[Cell::Value(0.0), Cell::Value(50.0), Cell::Failed]
        );
        assert_eq!(
            relative.row(1).unwrap(),
            &[Cell::NotComputable, Cell::NotComputable, Cell::Failed]
        );
    }

    #[test]
    fn test_uncomputable_baseline_carries_over() {
        let mut ledger = RunLedger::new();
        ledger
            .record(solved(0, RunKind::Baseline, &[("Profit", Vec::new())]))
            .unwrap();
        ledger
            .record(solved(1, perturbed("A"), &[("Profit", vec![3.0])]))
            .unwrap();
        let outcomes = [r("Profit")];
        let matrix = compute_matrix(
            &ledger,
            None,
            &MatrixRequest {
                statistic: Statistic::Mean,
                outcomes: &outcomes,
                excluded_parameters: &[],
            },
        );
        assert_eq!(matrix.row(0).unwrap(), &[Cell::NotComputable, Cell::Value(3.0)]);

        let relative = percent_deviation(&matrix);
        assert_eq!(
            relative.row(0).unwrap(),
            &[Cell::NotComputable, Cell::NotComputable]
        );
    }

    #[test]
    fn test_deviation_percent() {
        assert_eq!(deviation_percent(1050.0, 1000.0), Some(5.0));
        assert_eq!(deviation_percent(-5.0, -10.0), Some(-50.0));
        assert_eq!(deviation_percent(1.0, 0.0), None);
        assert_eq!(deviation_percent(1.0, -0.0), None);
    }
}
