//! Scenario tests for the sensitivity engine
//!
//! Tests are organized by topic:
//! - `support` - Scripted model backend with failure injection and solve hooks
//! - `scheduling` - Schedule construction and controller lifecycle
//! - `pause_resume` - Cooperative pause/stop across run boundaries
//! - `failures` - Solve failures recorded without aborting the sequence
//! - `aggregation` - Matrices, relative deviation and filtering end to end

mod failures;
mod pause_resume;
mod support;
