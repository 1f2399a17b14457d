//! References to model quantities and scenario selectors
//!
//! References are written as text (`Plant.capacity`, `ProfitTotal`,
//! `dataset:Demand`) and parsed into a typed form so that equality and
//! ordering are on the meaning, not the spelling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const DATASET_PREFIX: &str = "dataset:";

/// A perturbable or observable quantity in the model
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuantityRef {
    /// An attribute of a model entity, written `Entity.attribute`
    Attribute { entity: String, attribute: String },
    /// An equation, referenced by its own name
    Equation(String),
    /// A dataset selector, written `dataset:Name`
    Dataset(String),
}

impl QuantityRef {
    pub fn attribute(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Attribute {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }

    pub fn equation(name: impl Into<String>) -> Self {
        Self::Equation(name.into())
    }

    pub fn dataset(name: impl Into<String>) -> Self {
        Self::Dataset(name.into())
    }

    /// Short label for report headers (the attribute or equation name)
    #[must_use]
    pub fn short_label(&self) -> &str {
        match self {
            Self::Attribute { attribute, .. } => attribute,
            Self::Equation(name) | Self::Dataset(name) => name,
        }
    }

    #[must_use]
    pub fn is_dataset(&self) -> bool {
        matches!(self, Self::Dataset(_))
    }
}

impl fmt::Display for QuantityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute { entity, attribute } => write!(f, "{entity}.{attribute}"),
            Self::Equation(name) => write!(f, "{name}"),
            Self::Dataset(name) => write!(f, "{DATASET_PREFIX}{name}"),
        }
    }
}

impl FromStr for QuantityRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyReference);
        }

        if let Some(name) = text.strip_prefix(DATASET_PREFIX) {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::MalformedReference(text.to_string()));
            }
            return Ok(Self::dataset(name));
        }

        match text.split_once('.') {
            Some((entity, attribute)) => {
                let (entity, attribute) = (entity.trim(), attribute.trim());
                if entity.is_empty() || attribute.is_empty() {
                    return Err(ValidationError::MalformedReference(text.to_string()));
                }
                Ok(Self::attribute(entity, attribute))
            }
            None => Ok(Self::equation(text)),
        }
    }
}

impl TryFrom<String> for QuantityRef {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuantityRef> for String {
    fn from(value: QuantityRef) -> Self {
        value.to_string()
    }
}

/// A scenario selector token (one dataset modification of the base case)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorToken(pub String);

impl SelectorToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SelectorToken {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}
