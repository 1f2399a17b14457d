//! Append-only record of the runs of one analysis session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SolveFailure, StateError};
use crate::model::{Perturbation, QuantityRef, TimeSeries};

use super::SeriesStats;

/// What a run measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunKind {
    /// No parameter perturbed
    Baseline,
    /// Exactly one parameter perturbed
    Perturbed(Perturbation),
}

impl RunKind {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Baseline => "Baseline".to_string(),
            Self::Perturbed(p) => p.label(),
        }
    }

    #[must_use]
    pub fn parameter(&self) -> Option<&QuantityRef> {
        match self {
            Self::Baseline => None,
            Self::Perturbed(p) => Some(&p.parameter),
        }
    }

    #[must_use]
    pub fn is_baseline(&self) -> bool {
        matches!(self, Self::Baseline)
    }
}

/// One outcome's recorded series plus its summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSeries {
    pub outcome: QuantityRef,
    pub values: TimeSeries,
    /// `None` when the series is empty
    pub stats: Option<SeriesStats>,
}

impl OutcomeSeries {
    pub fn new(outcome: QuantityRef, values: TimeSeries) -> Self {
        let stats = SeriesStats::from_values(&values);
        Self {
            outcome,
            values,
            stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    Solved(Vec<OutcomeSeries>),
    Failed(SolveFailure),
}

/// A completed (or failed) run. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub index: usize,
    pub kind: RunKind,
    pub outcome: RunOutcome,
    pub recorded_at: jiff::Timestamp,
    pub solve_time: Duration,
}

impl Run {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed(_))
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SolveFailure> {
        match &self.outcome {
            RunOutcome::Failed(failure) => Some(failure),
            RunOutcome::Solved(_) => None,
        }
    }

    /// The recorded series for `outcome`, if this run solved and measured it
    #[must_use]
    pub fn series(&self, outcome: &QuantityRef) -> Option<&OutcomeSeries> {
        match &self.outcome {
            RunOutcome::Solved(series) => series.iter().find(|s| &s.outcome == outcome),
            RunOutcome::Failed(_) => None,
        }
    }
}

/// Ordered, gapless sequence of runs.
///
/// Only the run controller appends; only the session clears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLedger {
    runs: Vec<Run>,
}

impl RunLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    #[must_use]
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Run> {
        self.runs.get(index)
    }

    #[must_use]
    pub fn last(&self) -> Option<&Run> {
        self.runs.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter()
    }

    /// Number of runs whose solve failed
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.runs.iter().filter(|run| run.is_failed()).count()
    }

    /// Append a run. Its index must be exactly the next one.
    pub(crate) fn record(&mut self, run: Run) -> Result<(), StateError> {
        let expected = self.runs.len();
        if run.index != expected {
            return Err(StateError::OutOfOrder {
                expected,
                got: run.index,
            });
        }
        self.runs.push(run);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.runs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(index: usize, outcome: RunOutcome) -> Run {
        Run {
            index,
            kind: RunKind::Baseline,
            outcome,
            recorded_at: jiff::Timestamp::UNIX_EPOCH,
            solve_time: Duration::ZERO,
        }
    }

    #[test]
    fn test_record_enforces_order() {
        let mut ledger = RunLedger::new();
        ledger.record(run(0, RunOutcome::Solved(Vec::new()))).unwrap();

        let err = ledger
            .record(run(2, RunOutcome::Solved(Vec::new())))
            .unwrap_err();
        assert_eq!(err, StateError::OutOfOrder { expected: 1, got: 2 });
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_failure_count_and_series_lookup() {
        let profit = QuantityRef::equation("ProfitTotal");
        let mut ledger = RunLedger::new();
        ledger
            .record(run(
                0,
                RunOutcome::Solved(vec![OutcomeSeries::new(profit.clone(), vec![1.0, 3.0])]),
            ))
            .unwrap();
        ledger
            .record(run(1, RunOutcome::Failed(SolveFailure::Infeasible("x".into()))))
            .unwrap();

        assert_eq!(ledger.failure_count(), 1);
        let series = ledger.get(0).unwrap().series(&profit).unwrap();
        assert_eq!(series.stats.unwrap().mean, 2.0);
        assert!(ledger.get(1).unwrap().series(&profit).is_none());
    }

    #[test]
    fn test_empty_series_has_no_stats() {
        let series = OutcomeSeries::new(QuantityRef::equation("Cost"), Vec::new());
        assert!(series.stats.is_none());
    }
}
