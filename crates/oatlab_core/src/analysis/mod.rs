//! One-at-a-time sensitivity analysis.
//!
//! A [`PerturbationSet`] names the parameters to nudge and the outcomes to
//! watch. The [`RunController`] turns it into a schedule (baseline first,
//! then one run per enabled parameter) and executes the runs one by one
//! against a [`ModelBackend`](crate::model::ModelBackend), appending each to
//! the [`RunLedger`]. The aggregator reduces the ledger to a value matrix.
//!
//! ```ignore
//! use oatlab_core::analysis::{MatrixRequest, RunController, RunLedger, Statistic};
//!
//! let mut controller = RunController::new();
//! let mut ledger = RunLedger::new();
//! controller.start(&set)?;
//! while controller.state() == ControllerState::Running {
//!     controller.step(&model, &mut ledger)?;
//! }
//!
//! let outcomes: Vec<_> = set.enabled_outcomes().cloned().collect();
//! let matrix = compute_matrix(&ledger, controller.plan(), &MatrixRequest {
//!     statistic: Statistic::Final,
//!     outcomes: &outcomes,
//!     excluded_parameters: &[],
//! });
//! let relative = percent_deviation(&matrix);
//! ```

mod aggregator;
mod color;
mod controller;
mod ledger;
mod perturbation;
mod statistic;

pub use aggregator::*;
pub use color::*;
pub use controller::*;
pub use ledger::*;
pub use perturbation::*;
pub use statistic::*;
