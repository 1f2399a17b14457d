//! The seam between the engine and the optimization model.
//!
//! The engine never looks inside a model. Everything it needs (resolving
//! references, listing scenario selectors, building a perturbed variant and
//! solving it) goes through [`ModelBackend`].

use serde::{Deserialize, Serialize};

use crate::error::SolveFailure;

use super::{QuantityRef, SelectorToken};

/// Recorded outcome values, one per model period
pub type TimeSeries = Vec<f64>;

/// One parameter scaled by a signed percentage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perturbation {
    pub parameter: QuantityRef,
    pub delta_percent: f64,
}

impl Perturbation {
    pub fn new(parameter: QuantityRef, delta_percent: f64) -> Self {
        Self {
            parameter,
            delta_percent,
        }
    }

    /// Apply the perturbation to a parameter's unperturbed value
    #[must_use]
    pub fn apply(&self, base: f64) -> f64 {
        base * (1.0 + self.delta_percent / 100.0)
    }

    /// Label like `CapacityA +10%`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {:+}%", self.parameter, self.delta_percent)
    }
}

/// Everything needed to build one run-ready model variant
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSpec {
    /// `None` for the baseline run
    pub perturbation: Option<Perturbation>,
    /// Base case selectors, applied in order
    pub selectors: Vec<SelectorToken>,
}

impl VariantSpec {
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        self.perturbation.is_none()
    }
}

/// Operations the engine consumes from the model collaborator.
///
/// `solve` may block for a long time; the controller calls it once per run
/// and never concurrently.
pub trait ModelBackend {
    /// A run-ready model with one perturbation and the base case applied
    type Variant;

    /// Check that `reference` names a perturbable quantity. The error is a
    /// human-readable reason.
    fn resolve_parameter(&self, reference: &QuantityRef) -> Result<(), String>;

    /// Check that `reference` names an observable quantity
    fn resolve_outcome(&self, reference: &QuantityRef) -> Result<(), String>;

    /// Every scenario selector the model knows
    fn scenario_selectors(&self) -> Vec<SelectorToken>;

    fn build_variant(&self, spec: &VariantSpec) -> Result<Self::Variant, SolveFailure>;

    /// Solve a variant, returning one series per requested outcome, in order
    fn solve(
        &self,
        variant: &Self::Variant,
        outcomes: &[QuantityRef],
    ) -> Result<Vec<TimeSeries>, SolveFailure>;
}
