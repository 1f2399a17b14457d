//! Study files: a model definition plus the perturbation set to run on it.
//!
//! ```yaml
//! delta: 10%
//! base_case: [HighDemand]
//! parameters:
//!   - CapacityA
//!   - { name: Plant.cost, enabled: false }
//! outcomes: [ProfitTotal]
//! model:
//!   horizon: 12
//!   parameters:
//!     - { name: CapacityA, value: 100, max: 150 }
//!   outcomes:
//!     - name: ProfitTotal
//!       intercept: 500
//!       terms: [{ parameter: CapacityA, coefficient: 5 }]
//! ```

use std::fs;
use std::path::Path;

use oatlab_core::analysis::{DEFAULT_DELTA_PERCENT, ListKind, parse_delta};
use oatlab_core::{AnalysisSession, LinearModel, QuantityRef, SelectorToken};
use serde::{Deserialize, Serialize};

/// Error types for loading a study
#[derive(Debug)]
pub enum StudyError {
    Io(String),
    Parse(String),
    Model(String),
    Invalid(String),
}

impl std::fmt::Display for StudyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StudyError::Io(msg) => write!(f, "IO error: {msg}"),
            StudyError::Parse(msg) => write!(f, "Parse error: {msg}"),
            StudyError::Model(msg) => write!(f, "Model error: {msg}"),
            StudyError::Invalid(msg) => write!(f, "Invalid study: {msg}"),
        }
    }
}

impl std::error::Error for StudyError {}

/// A list entry, either a bare reference or one with its checkbox state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntrySpec {
    Name(QuantityRef),
    Detailed {
        name: QuantityRef,
        #[serde(default = "enabled_by_default")]
        enabled: bool,
    },
}

fn enabled_by_default() -> bool {
    true
}

impl EntrySpec {
    fn reference(&self) -> &QuantityRef {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    fn enabled(&self) -> bool {
        match self {
            Self::Name(_) => true,
            Self::Detailed { enabled, .. } => *enabled,
        }
    }
}

/// Delta as written in the file: `10`, `-5.5` or `"10%"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeltaSpec {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub model: LinearModel,
    #[serde(default)]
    pub parameters: Vec<EntrySpec>,
    #[serde(default)]
    pub outcomes: Vec<EntrySpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaSpec>,
    #[serde(default)]
    pub base_case: Vec<SelectorToken>,
}

impl Study {
    pub fn from_yaml(yaml: &str) -> Result<Self, StudyError> {
        serde_saphyr::from_str(yaml).map_err(|e| StudyError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, StudyError> {
        let content = fs::read_to_string(path)
            .map_err(|e| StudyError::Io(format!("{}: {e}", path.display())))?;
        let study = Self::from_yaml(&content)?;
        tracing::info!(
            path = %path.display(),
            parameters = study.parameters.len(),
            outcomes = study.outcomes.len(),
            "study loaded"
        );
        Ok(study)
    }

    /// Delta in percent, with `delta_override` taking precedence
    pub fn delta_percent(&self, delta_override: Option<&str>) -> Result<f64, StudyError> {
        let invalid = |e: oatlab_core::ValidationError| StudyError::Invalid(e.to_string());
        match (delta_override, &self.delta) {
            (Some(text), _) => parse_delta(text).map_err(invalid),
            (None, Some(DeltaSpec::Number(value))) => Ok(*value),
            (None, Some(DeltaSpec::Text(text))) => parse_delta(text).map_err(invalid),
            (None, None) => Ok(DEFAULT_DELTA_PERCENT),
        }
    }

    /// Validate the model and fill a fresh session from the study's lists
    pub fn build_session(&self, delta_override: Option<&str>) -> Result<AnalysisSession, StudyError> {
        self.model
            .validate()
            .map_err(|e| StudyError::Model(e.to_string()))?;

        let invalid = |e: oatlab_core::ValidationError| StudyError::Invalid(e.to_string());
        let mut session = AnalysisSession::new();

        for (index, entry) in self.parameters.iter().enumerate() {
            session
                .add_parameter(&self.model, entry.reference().clone())
                .map_err(invalid)?;
            if !entry.enabled() {
                session
                    .set_enabled(ListKind::Parameters, index, false)
                    .map_err(invalid)?;
            }
        }
        for (index, entry) in self.outcomes.iter().enumerate() {
            session
                .add_outcome(&self.model, entry.reference().clone())
                .map_err(invalid)?;
            if !entry.enabled() {
                session
                    .set_enabled(ListKind::Outcomes, index, false)
                    .map_err(invalid)?;
            }
        }

        session
            .set_delta(self.delta_percent(delta_override)?)
            .map_err(invalid)?;
        session
            .set_base_case_selectors(&self.model, self.base_case.clone())
            .map_err(invalid)?;
        Ok(session)
    }
}
