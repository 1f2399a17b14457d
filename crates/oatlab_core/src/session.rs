//! The analysis session: one perturbation set, its run ledger and the
//! controller that fills it.
//!
//! Every caller-facing operation goes through [`AnalysisSession`], which
//! also raises the "results may be stale" notice when the set is edited
//! after runs have been recorded, and tells observers what happened.

use std::fmt;

use serde::Serialize;

use crate::analysis::{
    ColorScale, ControlHandle, ControllerState, Direction, ListKind, MatrixRequest, Run,
    RunController, RunLedger, PerturbationSet, Statistic, StepReport, ValueMatrix, compute_matrix,
    parse_delta, percent_deviation,
};
use crate::error::{StateError, ValidationError};
use crate::model::{ModelBackend, QuantityRef, SelectorToken};

/// Notifications delivered to subscribed observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    RunRecorded {
        index: usize,
        label: String,
        failed: bool,
    },
    StateChanged {
        from: ControllerState,
        to: ControllerState,
    },
    /// The perturbation set changed after runs were recorded
    ResultsStale,
    ResultsCleared,
}

pub trait SessionObserver: Send {
    fn on_event(&mut self, event: &SessionEvent);
}

impl<F> SessionObserver for F
where
    F: FnMut(&SessionEvent) + Send,
{
    fn on_event(&mut self, event: &SessionEvent) {
        self(event)
    }
}

/// Serializable read-only view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: ControllerState,
    pub progress: String,
    pub schedule: Vec<String>,
    pub delta_percent: f64,
    pub base_case: Vec<SelectorToken>,
    pub runs: Vec<Run>,
    pub failures: usize,
    pub stale: bool,
    pub selected_run: Option<usize>,
}

#[derive(Default)]
pub struct AnalysisSession {
    set: PerturbationSet,
    ledger: RunLedger,
    controller: RunController,
    selected_run: Option<usize>,
    stale: bool,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("set", &self.set)
            .field("ledger", &self.ledger)
            .field("controller", &self.controller)
            .field("selected_run", &self.selected_run)
            .field("stale", &self.stale)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl AnalysisSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    #[must_use]
    pub fn perturbations(&self) -> &PerturbationSet {
        &self.set
    }

    #[must_use]
    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    #[must_use]
    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    #[must_use]
    pub fn progress(&self) -> String {
        self.controller.progress()
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    #[must_use]
    pub fn selected_run(&self) -> Option<&Run> {
        self.selected_run.and_then(|i| self.ledger.get(i))
    }

    /// Pause/stop handle usable from another thread
    #[must_use]
    pub fn handle(&self) -> ControlHandle {
        self.controller.handle()
    }

    pub fn subscribe(&mut self, observer: impl SessionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            progress: self.progress(),
            schedule: self.controller.plan().map(|p| p.labels()).unwrap_or_default(),
            delta_percent: self.set.delta_percent(),
            base_case: self.set.base_case().to_vec(),
            runs: self.ledger.runs().to_vec(),
            failures: self.ledger.failure_count(),
            stale: self.stale,
            selected_run: self.selected_run,
        }
    }

    // ------------------------------------------------------------------
    // Perturbation set edits
    // ------------------------------------------------------------------

    pub fn add_parameter<M: ModelBackend>(
        &mut self,
        model: &M,
        reference: QuantityRef,
    ) -> Result<(), ValidationError> {
        self.set.add_parameter(model, reference)?;
        self.edited(true);
        Ok(())
    }

    pub fn add_outcome<M: ModelBackend>(
        &mut self,
        model: &M,
        reference: QuantityRef,
    ) -> Result<(), ValidationError> {
        self.set.add_outcome(model, reference)?;
        self.edited(true);
        Ok(())
    }

    pub fn remove(&mut self, kind: ListKind, index: usize) -> Result<QuantityRef, ValidationError> {
        let removed = self.set.remove(kind, index)?;
        self.edited(true);
        Ok(removed.reference)
    }

    pub fn move_entry(
        &mut self,
        kind: ListKind,
        index: usize,
        direction: Direction,
    ) -> Result<bool, ValidationError> {
        let moved = self.set.move_entry(kind, index, direction)?;
        self.edited(moved);
        Ok(moved)
    }

    pub fn set_enabled(
        &mut self,
        kind: ListKind,
        index: usize,
        enabled: bool,
    ) -> Result<bool, ValidationError> {
        let changed = self.set.set_enabled(kind, index, enabled)?;
        self.edited(changed);
        Ok(changed)
    }

    /// Cursor moves never make results stale
    pub fn select(&mut self, kind: ListKind, index: Option<usize>) -> Result<(), ValidationError> {
        self.set.select(kind, index)
    }

    pub fn set_delta(&mut self, delta_percent: f64) -> Result<bool, ValidationError> {
        let changed = self.set.set_delta(delta_percent)?;
        self.edited(changed);
        Ok(changed)
    }

    /// Parse and set the delta from user text such as `"10"` or `"-5%"`
    pub fn set_delta_text(&mut self, text: &str) -> Result<bool, ValidationError> {
        self.set_delta(parse_delta(text)?)
    }

    pub fn set_base_case_selectors<M: ModelBackend>(
        &mut self,
        model: &M,
        tokens: Vec<SelectorToken>,
    ) -> Result<bool, ValidationError> {
        let changed = self.set.set_base_case_selectors(model, tokens)?;
        self.edited(changed);
        Ok(changed)
    }

    fn edited(&mut self, changed: bool) {
        if !changed || self.ledger.is_empty() {
            return;
        }
        if !self.stale {
            tracing::warn!(
                runs = self.ledger.len(),
                "perturbation set changed after runs were recorded; results may be stale"
            );
        }
        self.stale = true;
        self.emit(&SessionEvent::ResultsStale);
    }

    // ------------------------------------------------------------------
    // Run control
    // ------------------------------------------------------------------

    pub fn start(&mut self) -> Result<(), StateError> {
        let from = self.state();
        self.controller.start(&self.set)?;
        self.state_changed(from);
        Ok(())
    }

    /// Request a pause at the next run boundary
    pub fn pause(&mut self) -> Result<(), StateError> {
        self.controller.pause()
    }

    pub fn stop(&mut self) -> Result<(), StateError> {
        let from = self.state();
        self.controller.stop()?;
        tracing::info!(recorded = self.ledger.len(), "analysis stopped");
        self.state_changed(from);
        Ok(())
    }

    /// Execute exactly one scheduled run
    pub fn step<M: ModelBackend>(&mut self, model: &M) -> Result<StepReport, StateError> {
        let from = self.state();
        let report = self.controller.step(model, &mut self.ledger)?;
        if let Some(run) = report.recorded.and_then(|i| self.ledger.get(i)) {
            let event = SessionEvent::RunRecorded {
                index: run.index,
                label: run.kind.label(),
                failed: run.is_failed(),
            };
            self.emit(&event);
        }
        self.state_changed(from);
        Ok(report)
    }

    /// Step until the controller leaves `Running`; returns the state it
    /// ended in
    pub fn run<M: ModelBackend>(&mut self, model: &M) -> Result<ControllerState, StateError> {
        while self.state() == ControllerState::Running {
            self.step(model)?;
        }
        Ok(self.state())
    }

    /// Empty the ledger and return to `Idle`. Calling it again is a no-op.
    pub fn clear_results(&mut self) -> Result<(), StateError> {
        let from = self.state();
        if from == ControllerState::Running {
            return Err(StateError::InvalidTransition {
                action: "clear results",
                state: from,
            });
        }
        let had_results = !self.ledger.is_empty() || from != ControllerState::Idle;

        self.ledger.clear();
        self.controller.reset();
        self.selected_run = None;
        self.stale = false;

        if had_results {
            tracing::info!("results cleared");
            self.emit(&SessionEvent::ResultsCleared);
        }
        self.state_changed(from);
        Ok(())
    }

    /// Point at a recorded run, or clear the pointer
    pub fn select_run(&mut self, index: Option<usize>) -> Result<(), StateError> {
        if let Some(i) = index
            && self.ledger.get(i).is_none()
        {
            return Err(StateError::UnknownRun(i));
        }
        self.selected_run = index;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    /// Matrix over the enabled outcomes. Runs of parameters that are
    /// currently unticked are left out.
    #[must_use]
    pub fn compute_matrix(&self, statistic: Statistic) -> ValueMatrix {
        let outcomes: Vec<QuantityRef> = self.set.enabled_outcomes().cloned().collect();
        let excluded: Vec<QuantityRef> = self.set.disabled_parameters().cloned().collect();
        self.matrix_for(&MatrixRequest {
            statistic,
            outcomes: &outcomes,
            excluded_parameters: &excluded,
        })
    }

    #[must_use]
    pub fn matrix_for(&self, request: &MatrixRequest<'_>) -> ValueMatrix {
        compute_matrix(&self.ledger, self.controller.plan(), request)
    }

    #[must_use]
    pub fn relative_matrix(&self, statistic: Statistic) -> ValueMatrix {
        percent_deviation(&self.compute_matrix(statistic))
    }

    /// Default display scale for relative matrices
    #[must_use]
    pub fn color_scale(&self) -> ColorScale {
        ColorScale::default()
    }

    fn state_changed(&mut self, from: ControllerState) {
        let to = self.state();
        if from != to {
            tracing::info!(%from, %to, "analysis state changed");
            self.emit(&SessionEvent::StateChanged { from, to });
        }
    }

    fn emit(&mut self, event: &SessionEvent) {
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }
}
