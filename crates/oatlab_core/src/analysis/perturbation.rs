//! The caller-edited description of an OAT study: which parameters to
//! perturb, which outcomes to record, by how much, and against which base
//! case.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::model::{ModelBackend, QuantityRef, SelectorToken};

/// Default perturbation magnitude, in percent
pub const DEFAULT_DELTA_PERCENT: f64 = 10.0;

/// Which of the two ordered lists an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    Parameters,
    Outcomes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

/// A parameter or outcome, with its checklist state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub reference: QuantityRef,
    /// Disabled entries keep their place but are left out of runs and matrices
    pub enabled: bool,
}

pub type Parameter = Entry;
pub type Outcome = Entry;

/// Parse caller text into a delta percentage. Accepts a trailing `%`.
pub fn parse_delta(text: &str) -> Result<f64, ValidationError> {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let value: f64 = number
        .parse()
        .map_err(|_| ValidationError::NonNumericDelta(text.to_string()))?;
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteDelta(value));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationSet {
    parameters: Vec<Entry>,
    outcomes: Vec<Entry>,
    parameter_cursor: Option<usize>,
    outcome_cursor: Option<usize>,
    delta_percent: f64,
    base_case: Vec<SelectorToken>,
}

impl Default for PerturbationSet {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            outcomes: Vec::new(),
            parameter_cursor: None,
            outcome_cursor: None,
            delta_percent: DEFAULT_DELTA_PERCENT,
            base_case: Vec::new(),
        }
    }
}

impl PerturbationSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[must_use]
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn enabled_parameters(&self) -> impl Iterator<Item = &QuantityRef> {
        self.parameters
            .iter()
            .filter(|e| e.enabled)
            .map(|e| &e.reference)
    }

    pub fn enabled_outcomes(&self) -> impl Iterator<Item = &QuantityRef> {
        self.outcomes
            .iter()
            .filter(|e| e.enabled)
            .map(|e| &e.reference)
    }

    /// Parameters the checklist excludes
    pub fn disabled_parameters(&self) -> impl Iterator<Item = &QuantityRef> {
        self.parameters
            .iter()
            .filter(|e| !e.enabled)
            .map(|e| &e.reference)
    }

    #[must_use]
    pub fn delta_percent(&self) -> f64 {
        self.delta_percent
    }

    #[must_use]
    pub fn base_case(&self) -> &[SelectorToken] {
        &self.base_case
    }

    #[must_use]
    pub fn cursor(&self, kind: ListKind) -> Option<usize> {
        match kind {
            ListKind::Parameters => self.parameter_cursor,
            ListKind::Outcomes => self.outcome_cursor,
        }
    }

    fn list(&self, kind: ListKind) -> &Vec<Entry> {
        match kind {
            ListKind::Parameters => &self.parameters,
            ListKind::Outcomes => &self.outcomes,
        }
    }

    fn list_and_cursor(&mut self, kind: ListKind) -> (&mut Vec<Entry>, &mut Option<usize>) {
        match kind {
            ListKind::Parameters => (&mut self.parameters, &mut self.parameter_cursor),
            ListKind::Outcomes => (&mut self.outcomes, &mut self.outcome_cursor),
        }
    }

    fn check_index(&self, kind: ListKind, index: usize) -> Result<(), ValidationError> {
        let len = self.list(kind).len();
        if index >= len {
            return Err(ValidationError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    /// Append a parameter after checking it is new and resolves in `model`
    pub fn add_parameter<M: ModelBackend>(
        &mut self,
        model: &M,
        reference: QuantityRef,
    ) -> Result<&Parameter, ValidationError> {
        self.check_new(ListKind::Parameters, &reference)?;
        model
            .resolve_parameter(&reference)
            .map_err(|reason| ValidationError::Unresolved {
                reference: reference.clone(),
                reason,
            })?;
        self.push(ListKind::Parameters, reference)
    }

    /// Append an outcome after checking it is new and resolves in `model`
    pub fn add_outcome<M: ModelBackend>(
        &mut self,
        model: &M,
        reference: QuantityRef,
    ) -> Result<&Outcome, ValidationError> {
        self.check_new(ListKind::Outcomes, &reference)?;
        model
            .resolve_outcome(&reference)
            .map_err(|reason| ValidationError::Unresolved {
                reference: reference.clone(),
                reason,
            })?;
        self.push(ListKind::Outcomes, reference)
    }

    fn check_new(&self, kind: ListKind, reference: &QuantityRef) -> Result<(), ValidationError> {
        if self.list(kind).iter().any(|e| &e.reference == reference) {
            return Err(ValidationError::Duplicate(reference.clone()));
        }
        Ok(())
    }

    fn push(&mut self, kind: ListKind, reference: QuantityRef) -> Result<&Entry, ValidationError> {
        let (list, _) = self.list_and_cursor(kind);
        list.push(Entry {
            reference,
            enabled: true,
        });
        Ok(&list[list.len() - 1])
    }

    /// Remove an entry; the cursor keeps pointing at the same entry, or is
    /// cleared if that entry was removed
    pub fn remove(&mut self, kind: ListKind, index: usize) -> Result<Entry, ValidationError> {
        self.check_index(kind, index)?;
        let (list, cursor) = self.list_and_cursor(kind);
        let removed = list.remove(index);
        *cursor = match *cursor {
            Some(c) if c == index => None,
            Some(c) if c > index => Some(c - 1),
            other => other,
        };
        Ok(removed)
    }

    /// Swap an entry with its neighbour. Returns `false` at the list boundary.
    pub fn move_entry(
        &mut self,
        kind: ListKind,
        index: usize,
        direction: Direction,
    ) -> Result<bool, ValidationError> {
        self.check_index(kind, index)?;
        let (list, cursor) = self.list_and_cursor(kind);
        let target = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < list.len() => index + 1,
            _ => return Ok(false),
        };
        list.swap(index, target);
        *cursor = match *cursor {
            Some(c) if c == index => Some(target),
            Some(c) if c == target => Some(index),
            other => other,
        };
        Ok(true)
    }

    /// Tick or untick an entry in the checklist. Returns whether it changed.
    pub fn set_enabled(
        &mut self,
        kind: ListKind,
        index: usize,
        enabled: bool,
    ) -> Result<bool, ValidationError> {
        self.check_index(kind, index)?;
        let (list, _) = self.list_and_cursor(kind);
        let entry = &mut list[index];
        let changed = entry.enabled != enabled;
        entry.enabled = enabled;
        Ok(changed)
    }

    /// Move the selection cursor of a list
    pub fn select(&mut self, kind: ListKind, index: Option<usize>) -> Result<(), ValidationError> {
        if let Some(i) = index {
            self.check_index(kind, i)?;
        }
        let (_, cursor) = self.list_and_cursor(kind);
        *cursor = index;
        Ok(())
    }

    /// Set the delta. Returns whether the value changed.
    pub fn set_delta(&mut self, delta_percent: f64) -> Result<bool, ValidationError> {
        if !delta_percent.is_finite() {
            return Err(ValidationError::NonFiniteDelta(delta_percent));
        }
        if delta_percent == 0.0 {
            tracing::warn!("delta of 0% makes every perturbed run identical to the baseline");
        }
        let changed = self.delta_percent != delta_percent;
        self.delta_percent = delta_percent;
        Ok(changed)
    }

    /// Replace the base case selectors. Every token must be known to the
    /// model and appear once; otherwise nothing changes.
    pub fn set_base_case_selectors<M: ModelBackend>(
        &mut self,
        model: &M,
        tokens: Vec<SelectorToken>,
    ) -> Result<bool, ValidationError> {
        let known: FxHashSet<SelectorToken> = model.scenario_selectors().into_iter().collect();
        let mut seen = FxHashSet::default();
        for token in &tokens {
            if !known.contains(token) {
                return Err(ValidationError::UnknownSelector(token.to_string()));
            }
            if !seen.insert(token) {
                return Err(ValidationError::DuplicateSelector(token.to_string()));
            }
        }
        let changed = self.base_case != tokens;
        self.base_case = tokens;
        Ok(changed)
    }
}
