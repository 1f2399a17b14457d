//! Run controller: the state machine that drives solver invocations one at a
//! time.
//!
//! ```text
//!            start                all runs done
//!   Idle ───────────▶ Running ─────────────────▶ Completed
//!                      │   ▲
//!        pause (at the │   │ start
//!        next boundary)▼   │
//!                      Paused
//!
//!   Running | Paused ──stop──▶ Stopped
//! ```
//!
//! Pause and stop are cooperative. A [`ControlHandle`] can request either
//! from another thread while the owning thread is blocked inside a solve;
//! the request is honored once that run has been recorded.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{SolveFailure, StateError};
use crate::model::{ModelBackend, Perturbation, QuantityRef, SelectorToken, VariantSpec};

use super::{OutcomeSeries, PerturbationSet, Run, RunKind, RunLedger, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ControllerState {
    /// No runs pending
    #[default]
    Idle,
    /// A sequence is in progress
    Running,
    /// Sequence suspended at a run boundary
    Paused,
    /// Sequence aborted by the caller
    Stopped,
    /// Every scheduled run has been recorded
    Completed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// One entry of the schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub index: usize,
    pub kind: RunKind,
}

/// Snapshot of the perturbation set taken when a sequence starts.
///
/// Later edits to the set never reach a sequence already in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub runs: Vec<ScheduledRun>,
    pub outcomes: Vec<QuantityRef>,
    pub base_case: Vec<SelectorToken>,
    pub delta_percent: f64,
}

impl RunPlan {
    /// Baseline first, then one run per enabled parameter in list order
    pub fn from_set(set: &PerturbationSet) -> Result<Self, StateError> {
        let outcomes: Vec<QuantityRef> = set.enabled_outcomes().cloned().collect();
        if outcomes.is_empty() {
            return Err(StateError::NoOutcomes);
        }

        let delta_percent = set.delta_percent();
        let runs = std::iter::once(RunKind::Baseline)
            .chain(
                set.enabled_parameters()
                    .map(|p| RunKind::Perturbed(Perturbation::new(p.clone(), delta_percent))),
            )
            .enumerate()
            .map(|(index, kind)| ScheduledRun { index, kind })
            .collect();

        Ok(Self {
            runs,
            outcomes,
            base_case: set.base_case().to_vec(),
            delta_percent,
        })
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
    pub fn variant_spec(&self, run: &ScheduledRun) -> VariantSpec {
        VariantSpec {
            perturbation: match &run.kind {
                RunKind::Baseline => None,
                RunKind::Perturbed(p) => Some(p.clone()),
            },
            selectors: self.base_case.clone(),
        }
    }

    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.runs.iter().map(|r| r.kind.label()).collect()
    }
}

/// Cross-thread pause/stop requests.
///
/// Clones share the same flags; the controller keeps one for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    pause: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl ControlHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the sequence to pause once the in-flight run is recorded
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Ask the sequence to stop once the in-flight run is recorded
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn take_pause(&self) -> bool {
        self.pause.swap(false, Ordering::SeqCst)
    }

    fn reset(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
    }
}

/// Result of executing one scheduled run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Index of the run recorded by this step, `None` if a pending request
    /// was honored before any run started
    pub recorded: Option<usize>,
    pub failed: bool,
    /// Controller state after the step
    pub state: ControllerState,
}

#[derive(Debug, Default)]
pub struct RunController {
    state: ControllerState,
    plan: Option<RunPlan>,
    next: usize,
    failures: usize,
    handle: ControlHandle,
    resumed_at: Option<Instant>,
    elapsed: Duration,
}

impl RunController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub fn plan(&self) -> Option<&RunPlan> {
        self.plan.as_ref()
    }

    /// A handle for requesting pause/stop from another thread
    #[must_use]
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    /// Index of the next run to execute
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Index of the last recorded run of the current sequence
    #[must_use]
    pub fn last_completed(&self) -> Option<usize> {
        self.next.checked_sub(1)
    }

    /// Number of runs of the current sequence recorded so far
    #[must_use]
    pub fn completed_runs(&self) -> usize {
        self.next
    }

    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.plan.as_ref().map_or(0, RunPlan::len)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Whether a pause has been requested but not yet honored
    #[must_use]
    pub fn pause_pending(&self) -> bool {
        self.state() == ControllerState::Running && self.handle.is_pause_requested()
    }

    /// Active (non-paused) time of the current sequence
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed + self.resumed_at.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Start a new sequence from `Idle`, or resume from `Paused`
    pub fn start(&mut self, set: &PerturbationSet) -> Result<(), StateError> {
        match self.state() {
            ControllerState::Running => return Err(StateError::AlreadyRunning),
            ControllerState::Idle => {
                let plan = RunPlan::from_set(set)?;
                tracing::info!(
                    runs = plan.len(),
                    outcomes = plan.outcomes.len(),
                    delta = plan.delta_percent,
                    "analysis scheduled"
                );
                self.plan = Some(plan);
                self.next = 0;
                self.failures = 0;
                self.elapsed = Duration::ZERO;
            }
            ControllerState::Paused => {
                tracing::info!(next = self.next, "analysis resumed");
            }
            state @ (ControllerState::Stopped | ControllerState::Completed) => {
                return Err(StateError::InvalidTransition {
                    action: "start",
                    state,
                });
            }
        }

        self.handle.reset();
        self.resumed_at = Some(Instant::now());
        self.state = ControllerState::Running;
        Ok(())
    }

    /// Request a pause at the next run boundary
    pub fn pause(&mut self) -> Result<(), StateError> {
        match self.state() {
            ControllerState::Running => {
                self.handle.request_pause();
                Ok(())
            }
            state => Err(StateError::InvalidTransition {
                action: "pause",
                state,
            }),
        }
    }

    /// Stop the sequence. No solve can be in flight while the caller holds
    /// `&mut self`, so this takes effect immediately.
    pub fn stop(&mut self) -> Result<(), StateError> {
        match self.state() {
            ControllerState::Running | ControllerState::Paused => {
                self.finish(ControllerState::Stopped);
                Ok(())
            }
            state => Err(StateError::InvalidTransition {
                action: "stop",
                state,
            }),
        }
    }

    /// Execute the next scheduled run and record it in `ledger`.
    ///
    /// Blocks for the duration of the solve. A failed solve is recorded as a
    /// failed run and the sequence carries on.
    pub fn step<M: ModelBackend>(
        &mut self,
        model: &M,
        ledger: &mut RunLedger,
    ) -> Result<StepReport, StateError> {
        let state = self.state();
        if state != ControllerState::Running {
            return Err(StateError::InvalidTransition {
                action: "step",
                state,
            });
        }

        if self.honor_requests() {
            return Ok(StepReport {
                recorded: None,
                failed: false,
                state: self.state(),
            });
        }

        let (scheduled, spec, outcomes, total) = {
            let plan = self.plan.as_ref().ok_or(StateError::InvalidTransition {
                action: "step",
                state,
            })?;
            let scheduled = plan.runs[self.next].clone();
            let spec = plan.variant_spec(&scheduled);
            (scheduled, spec, plan.outcomes.clone(), plan.len())
        };

        tracing::debug!(run = scheduled.index, total, label = %scheduled.kind.label(), "solving");
        let began = Instant::now();
        let outcome = execute(model, &spec, &outcomes);
        let run = Run {
            index: scheduled.index,
            kind: scheduled.kind,
            outcome,
            recorded_at: jiff::Timestamp::now(),
            solve_time: began.elapsed(),
        };

        let failed = run.is_failed();
        if let Some(failure) = run.failure() {
            self.failures += 1;
            tracing::warn!(run = run.index, %failure, "run failed; continuing with the next run");
        }
        let index = run.index;
        ledger.record(run)?;
        self.next += 1;

        if self.next == total {
            self.finish(ControllerState::Completed);
            tracing::info!(
                runs = total,
                failures = self.failures,
                elapsed_ms = self.elapsed.as_millis() as u64,
                "analysis completed"
            );
        } else {
            self.honor_requests();
        }

        Ok(StepReport {
            recorded: Some(index),
            failed,
            state: self.state(),
        })
    }

    /// Human-readable progress line.
    ///
    /// The run number is a 1-based count of recorded runs
    /// ([`completed_runs`](Self::completed_runs)), so "Paused after run 3 of 5"
    /// means runs 0 through 2 are recorded and `last_completed()` is `Some(2)`.
    #[must_use]
    pub fn progress(&self) -> String {
        let total = self.scheduled_len();
        let done = self.completed_runs();
        match self.state() {
            ControllerState::Idle => "Idle".to_string(),
            ControllerState::Running => format!("Run {done} of {total}"),
            ControllerState::Paused => format!("Paused after run {done} of {total}"),
            ControllerState::Stopped => format!("Stopped after run {done} of {total}"),
            ControllerState::Completed => {
                let mut text = format!("✓ {total} runs in {:.2}s", self.elapsed.as_secs_f64());
                if self.failures > 0 {
                    text.push_str(&format!(" ({} failed)", self.failures));
                }
                text
            }
        }
    }

    /// Back to `Idle` with no plan
    pub(crate) fn reset(&mut self) {
        self.handle.reset();
        self.state = ControllerState::Idle;
        self.plan = None;
        self.next = 0;
        self.failures = 0;
        self.resumed_at = None;
        self.elapsed = Duration::ZERO;
    }

    /// Apply pending cross-thread requests at a run boundary
    fn honor_requests(&mut self) -> bool {
        if self.handle.is_stop_requested() {
            self.finish(ControllerState::Stopped);
            tracing::info!(last = ?self.last_completed(), "analysis stopped");
            true
        } else if self.handle.take_pause() {
            self.finish(ControllerState::Paused);
            tracing::info!(last = ?self.last_completed(), "analysis paused");
            true
        } else {
            false
        }
    }

    fn finish(&mut self, state: ControllerState) {
        if let Some(resumed) = self.resumed_at.take() {
            self.elapsed += resumed.elapsed();
        }
        self.state = state;
    }
}

/// Build the variant, solve it, and turn the result into a run outcome
fn execute<M: ModelBackend>(model: &M, spec: &VariantSpec, outcomes: &[QuantityRef]) -> RunOutcome {
    let variant = match model.build_variant(spec) {
        Ok(variant) => variant,
        Err(failure) => return RunOutcome::Failed(failure),
    };

    match model.solve(&variant, outcomes) {
        Ok(series) if series.len() == outcomes.len() => RunOutcome::Solved(
            outcomes
                .iter()
                .cloned()
                .zip(series)
                .map(|(outcome, values)| OutcomeSeries::new(outcome, values))
                .collect(),
        ),
        Ok(series) => RunOutcome::Failed(SolveFailure::ShapeMismatch {
            expected: outcomes.len(),
            got: series.len(),
        }),
        Err(failure) => RunOutcome::Failed(failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ListKind;
    use crate::model::LinearModel;

    fn r(text: &str) -> QuantityRef {
        text.parse().unwrap()
    }

    fn setup(params: &[&str]) -> (LinearModel, PerturbationSet) {
        let mut model = LinearModel::new(2);
        for p in params {
            model = model.parameter(r(p), 1.0);
        }
        let terms: Vec<_> = params.iter().map(|p| (r(p), 1.0)).collect();
        model = model.outcome(r("Total"), 0.0, &terms);

        let mut set = PerturbationSet::new();
        for p in params {
            set.add_parameter(&model, r(p)).unwrap();
        }
        set.add_outcome(&model, r("Total")).unwrap();
        (model, set)
    }

    #[test]
    fn test_plan_is_baseline_then_enabled_parameters() {
        let (_, mut set) = setup(&["A", "B", "C"]);
        set.set_enabled(ListKind::Parameters, 1, false).unwrap();
        let plan = RunPlan::from_set(&set).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.runs[0].kind.is_baseline());
        assert_eq!(plan.runs[1].kind.parameter(), Some(&r("A")));
        assert_eq!(plan.runs[2].kind.parameter(), Some(&r("C")));
        assert_eq!(plan.runs[2].index, 2);
    }

    #[test]
    fn test_start_requires_outcome() {
        let mut controller = RunController::new();
        let set = PerturbationSet::new();
        assert_eq!(controller.start(&set), Err(StateError::NoOutcomes));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (_, set) = setup(&["A"]);
        let mut controller = RunController::new();
        controller.start(&set).unwrap();
        assert_eq!(controller.start(&set), Err(StateError::AlreadyRunning));
    }

    #[test]
    fn test_step_outside_running_is_rejected() {
        let (model, _) = setup(&["A"]);
        let mut controller = RunController::new();
        let mut ledger = RunLedger::new();
        assert!(matches!(
            controller.step(&model, &mut ledger),
            Err(StateError::InvalidTransition { action: "step", .. })
        ));
    }

    #[test]
    fn test_runs_to_completion() {
        let (model, set) = setup(&["A", "B"]);
        let mut controller = RunController::new();
        let mut ledger = RunLedger::new();
        controller.start(&set).unwrap();

        assert_eq!(controller.progress(), "Run 0 of 3");
        let first = controller.step(&model, &mut ledger).unwrap();
        assert_eq!(first.recorded, Some(0));
        assert_eq!(controller.progress(), "Run 1 of 3");

        controller.step(&model, &mut ledger).unwrap();
        let last = controller.step(&model, &mut ledger).unwrap();
        assert_eq!(last.state, ControllerState::Completed);
        assert_eq!(ledger.len(), 3);
        assert!(controller.progress().starts_with("✓ 3 runs in "));
        assert_eq!(
            controller.start(&set),
            Err(StateError::InvalidTransition {
                action: "start",
                state: ControllerState::Completed
            })
        );
    }

    #[test]
    fn test_pause_honored_after_run_then_resume() {
        let (model, set) = setup(&["A", "B"]);
        let mut controller = RunController::new();
        let mut ledger = RunLedger::new();
        controller.start(&set).unwrap();
        controller.step(&model, &mut ledger).unwrap();

        controller.pause().unwrap();
        assert!(controller.pause_pending());
        assert_eq!(controller.state(), ControllerState::Running);

        let report = controller.step(&model, &mut ledger).unwrap();
        assert_eq!(report.recorded, None);
        assert_eq!(controller.state(), ControllerState::Paused);
        assert_eq!(controller.last_completed(), Some(0));
        assert_eq!(controller.progress(), "Paused after run 1 of 3");

        controller.start(&set).unwrap();
        let report = controller.step(&model, &mut ledger).unwrap();
        assert_eq!(report.recorded, Some(1));
    }

    #[test]
    fn test_progress_counts_recorded_runs() {
        let (model, set) = setup(&["A", "B", "C", "D"]);
        let mut controller = RunController::new();
        let mut ledger = RunLedger::new();
        controller.start(&set).unwrap();
        for _ in 0..3 {
            controller.step(&model, &mut ledger).unwrap();
        }
        controller.pause().unwrap();
        controller.step(&model, &mut ledger).unwrap();

        assert_eq!(controller.state(), ControllerState::Paused);
        assert_eq!(controller.last_completed(), Some(2));
        assert_eq!(controller.completed_runs(), 3);
        assert_eq!(controller.progress(), "Paused after run 3 of 5");
    }

    #[test]
    fn test_handle_stop_takes_effect_at_boundary() {
        let (model, set) = setup(&["A", "B"]);
        let mut controller = RunController::new();
        let mut ledger = RunLedger::new();
        controller.start(&set).unwrap();
        controller.handle().request_stop();

        let report = controller.step(&model, &mut ledger).unwrap();
        assert_eq!(report.recorded, None);
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert!(ledger.is_empty());
        assert_eq!(controller.progress(), "Stopped after run 0 of 3");
    }

    #[test]
    fn test_stop_from_paused() {
        let (model, set) = setup(&["A"]);
        let mut controller = RunController::new();
        let mut ledger = RunLedger::new();
        controller.start(&set).unwrap();
        controller.pause().unwrap();
        controller.step(&model, &mut ledger).unwrap();
        assert_eq!(controller.state(), ControllerState::Paused);
        assert!(controller.pause().is_err());

        controller.stop().unwrap();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert!(controller.stop().is_err());
    }

    #[test]
    fn test_stop_while_running_is_immediate() {
        let (_, set) = setup(&["A"]);
        let mut controller = RunController::new();
        controller.start(&set).unwrap();
        controller.stop().unwrap();
        assert_eq!(controller.state(), ControllerState::Stopped);
    }
}
