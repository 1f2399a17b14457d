//! Scripted model backend
//!
//! Every outcome starts at a fixed baseline level; perturbing a parameter
//! adds that parameter's effect to every outcome. Individual solve calls
//! can be made to fail, and a hook runs inside each solve so tests can
//! poke the controller from "another thread" while a run is in flight.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SolveFailure;
use crate::model::{ModelBackend, QuantityRef, SelectorToken, TimeSeries, VariantSpec};
use crate::session::AnalysisSession;

type SolveHook = Box<dyn Fn(usize) + Send + Sync>;

pub fn r(text: &str) -> QuantityRef {
    text.parse().unwrap()
}

pub struct ScriptedModel {
    parameters: Vec<(QuantityRef, f64)>,
    outcomes: Vec<(QuantityRef, f64)>,
    horizon: usize,
    fail_calls: Vec<usize>,
    hook: Option<SolveHook>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    /// Parameters with their effect on every outcome, outcomes with their
    /// baseline level
    pub fn new(parameters: &[(&str, f64)], outcomes: &[(&str, f64)]) -> Self {
        Self {
            parameters: parameters.iter().map(|(p, e)| (r(p), *e)).collect(),
            outcomes: outcomes.iter().map(|(o, v)| (r(o), *v)).collect(),
            horizon: 3,
            fail_calls: Vec::new(),
            hook: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Make the n-th solve call (0-based) report an infeasible model
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_calls.push(call);
        self
    }

    /// Run `hook` with the call number at the start of every solve
    pub fn on_solve(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn solve_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A session with every parameter and outcome of this model added
    pub fn session(&self) -> AnalysisSession {
        let mut session = AnalysisSession::new();
        for (p, _) in &self.parameters {
            session.add_parameter(self, p.clone()).unwrap();
        }
        for (o, _) in &self.outcomes {
            session.add_outcome(self, o.clone()).unwrap();
        }
        session
    }
}

impl ModelBackend for ScriptedModel {
    type Variant = Option<QuantityRef>;

    fn resolve_parameter(&self, reference: &QuantityRef) -> Result<(), String> {
        if self.parameters.iter().any(|(p, _)| p == reference) {
            Ok(())
        } else {
            Err("unknown parameter".to_string())
        }
    }

    fn resolve_outcome(&self, reference: &QuantityRef) -> Result<(), String> {
        if self.outcomes.iter().any(|(o, _)| o == reference) {
            Ok(())
        } else {
            Err("unknown outcome".to_string())
        }
    }

    fn scenario_selectors(&self) -> Vec<SelectorToken> {
        vec![SelectorToken::new("Base")]
    }

    fn build_variant(&self, spec: &VariantSpec) -> Result<Self::Variant, SolveFailure> {
        Ok(spec.perturbation.as_ref().map(|p| p.parameter.clone()))
    }

    fn solve(
        &self,
        variant: &Self::Variant,
        outcomes: &[QuantityRef],
    ) -> Result<Vec<TimeSeries>, SolveFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.hook {
            hook(call);
        }
        if self.fail_calls.contains(&call) {
            return Err(SolveFailure::Infeasible(format!("scripted failure on call {call}")));
        }

        let effect = variant
            .as_ref()
            .and_then(|v| self.parameters.iter().find(|(p, _)| p == v))
            .map_or(0.0, |(_, e)| *e);

        outcomes
            .iter()
            .map(|o| {
                let level = self
                    .outcomes
                    .iter()
                    .find(|(name, _)| name == o)
                    .map(|(_, level)| *level + effect)
                    .ok_or_else(|| SolveFailure::MissingOutcome(o.to_string()))?;
                Ok(vec![level; self.horizon])
            })
            .collect()
    }
}
