//! Command-line sensitivity analysis
//!
//! Loads a study (a linear model plus the parameters and outcomes to vary),
//! runs the one-at-a-time sequence on a background worker and prints the
//! resulting value matrix:
//! - `study` - YAML study files
//! - `worker` - Background thread that owns the analysis session
//! - `report` - Table and JSON rendering
//! - `logging` - Size-rotated log file in the data directory

#![warn(clippy::all)]

pub mod cli;
pub mod format;
pub mod logging;
pub mod report;
pub mod study;
pub mod worker;

pub use cli::{Args, default_data_dir};
pub use logging::init_logging;
pub use study::{Study, StudyError};
pub use worker::{AnalysisRequest, AnalysisResponse, AnalysisWorker};
