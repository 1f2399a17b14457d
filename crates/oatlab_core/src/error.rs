//! Error taxonomy for the sensitivity engine.
//!
//! Three families, each with its own propagation rule:
//! - [`ValidationError`]: bad caller input, rejected synchronously with state unchanged
//! - [`StateError`]: an operation that is illegal in the current controller state
//! - [`SolveFailure`]: the model could not produce outcomes for one run; it is
//!   recorded in the ledger and never aborts the sequence

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::ControllerState;
use crate::model::QuantityRef;

/// Rejected edits to the perturbation set
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("reference is empty")]
    EmptyReference,

    #[error("malformed reference '{0}'")]
    MalformedReference(String),

    #[error("{0} is already in the list")]
    Duplicate(QuantityRef),

    #[error("{reference} does not resolve against the model: {reason}")]
    Unresolved {
        reference: QuantityRef,
        reason: String,
    },

    #[error("unknown scenario selector '{0}'")]
    UnknownSelector(String),

    #[error("scenario selector '{0}' is listed more than once")]
    DuplicateSelector(String),

    #[error("delta '{0}' is not a number")]
    NonNumericDelta(String),

    #[error("delta must be finite, got {0}")]
    NonFiniteDelta(f64),

    #[error("color saturation must be a positive number, got {0}")]
    InvalidSaturation(f64),

    #[error("index {index} is out of range for a list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Operations rejected because of the controller's current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("at least one enabled outcome is required to start an analysis")]
    NoOutcomes,

    #[error("analysis is already running")]
    AlreadyRunning,

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: ControllerState,
    },

    #[error("run {0} is not in the ledger")]
    UnknownRun(usize),

    #[error("run {got} recorded out of order (expected run {expected})")]
    OutOfOrder { expected: usize, got: usize },
}

/// A single run that the model could not solve.
///
/// Stored inside the ledger, so it is cloneable and serializable.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum SolveFailure {
    #[error("model is infeasible: {0}")]
    Infeasible(String),

    #[error("outcome {0} was not produced by the solver")]
    MissingOutcome(String),

    #[error("solver returned {got} series for {expected} outcomes")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("model variant could not be built: {0}")]
    Variant(String),

    #[error("solver error: {0}")]
    Solver(String),
}

/// Umbrella error for callers that do not care which family failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
