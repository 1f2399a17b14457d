//! One-at-a-time sensitivity analysis engine
//!
//! This crate measures how the outcomes of an optimization model respond
//! when each chosen parameter is nudged by a percentage, one at a time:
//! - Perturbation set: checklists of parameters and outcomes, plus the delta
//!   and the base case scenario selectors
//! - Run controller: a pausable, stoppable state machine that runs the
//!   baseline and then one solve per enabled parameter
//! - Run ledger: the append-only record of every run
//! - Aggregation: value matrices per summary statistic, percent deviation
//!   from the baseline and a diverging color scale
//!
//! The model itself sits behind [`model::ModelBackend`]; [`model::LinearModel`]
//! is a small reference implementation.
//!
//! ```ignore
//! use oatlab_core::{AnalysisSession, LinearModel, Statistic};
//!
//! let model: LinearModel = load_study()?;
//! let mut session = AnalysisSession::new();
//! session.add_parameter(&model, "CapacityA".parse()?)?;
//! session.add_outcome(&model, "ProfitTotal".parse()?)?;
//! session.start()?;
//! session.run(&model)?;
//!
//! let relative = session.relative_matrix(Statistic::Final);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod analysis;
pub mod error;
pub mod session;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use analysis::{
    Cell, ColorScale, ControlHandle, ControllerState, ListKind, RunController, RunLedger,
    PerturbationSet, Statistic, ValueMatrix, ValueMode,
};
pub use error::{AnalysisError, SolveFailure, StateError, ValidationError};
pub use model::{LinearModel, ModelBackend, QuantityRef, SelectorToken};
pub use session::{AnalysisSession, SessionEvent, SessionObserver, SessionSnapshot};
