//! Linear-response reference model
//!
//! A small, fully deterministic stand-in for an optimization model: each
//! outcome is an affine function of the parameters, compounded per period.
//! Parameters may carry feasible bounds; a variant that pushes a parameter
//! outside them fails to solve, the way an infeasible perturbation would.
//!
//! Used by the CLI (loaded from a study file), the tests and the benches.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SolveFailure;

use super::{ModelBackend, QuantityRef, SelectorToken, TimeSeries, VariantSpec};

fn default_horizon() -> usize {
    1
}

/// A perturbable model quantity with its base value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: QuantityRef,
    pub value: f64,
    /// Lower feasible bound (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper feasible bound (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ParameterDef {
    fn is_feasible(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Multiplier a scenario selector applies to one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorFactor {
    pub parameter: QuantityRef,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorDef {
    pub token: SelectorToken,
    #[serde(default)]
    pub factors: Vec<SelectorFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub parameter: QuantityRef,
    pub coefficient: f64,
}

/// `intercept + Σ coefficient × parameter`, compounded by `growth` per period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDef {
    pub name: QuantityRef,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub growth: f64,
}

/// Gaussian measurement noise added to every period.
///
/// Every variant draws from the same seed, so runs stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub std_dev: f64,
    #[serde(default)]
    pub seed: u64,
}

/// Errors in a model definition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinearModelError {
    #[error("horizon must be at least one period")]
    ZeroHorizon,

    #[error("parameter {0} is defined twice")]
    DuplicateParameter(QuantityRef),

    #[error("dataset reference {0} cannot be a parameter")]
    DatasetParameter(QuantityRef),

    #[error("outcome {0} is defined twice")]
    DuplicateOutcome(QuantityRef),

    #[error("selector '{0}' is defined twice")]
    DuplicateSelector(SelectorToken),

    #[error("{owner} refers to unknown parameter {parameter}")]
    UnknownParameter {
        owner: String,
        parameter: QuantityRef,
    },

    #[error("base value {value} of {parameter} lies outside its bounds")]
    InfeasibleBase { parameter: QuantityRef, value: f64 },

    #[error("noise standard deviation must be finite and non-negative, got {0}")]
    InvalidNoise(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub selectors: Vec<SelectorDef>,
    pub outcomes: Vec<OutcomeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<NoiseConfig>,
}

/// Parameter values after selectors and the perturbation are applied
#[derive(Debug, Clone, PartialEq)]
pub struct LinearVariant {
    pub values: FxHashMap<QuantityRef, f64>,
}

impl LinearModel {
    /// Create an empty model over `horizon` periods
    #[must_use]
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            parameters: Vec::new(),
            selectors: Vec::new(),
            outcomes: Vec::new(),
            noise: None,
        }
    }

    #[must_use]
    pub fn parameter(mut self, name: QuantityRef, value: f64) -> Self {
        self.parameters.push(ParameterDef {
            name,
            value,
            min: None,
            max: None,
        });
        self
    }

    #[must_use]
    pub fn bounded_parameter(mut self, name: QuantityRef, value: f64, min: f64, max: f64) -> Self {
        self.parameters.push(ParameterDef {
            name,
            value,
            min: Some(min),
            max: Some(max),
        });
        self
    }

    #[must_use]
    pub fn selector(mut self, token: &str, factors: &[(QuantityRef, f64)]) -> Self {
        self.selectors.push(SelectorDef {
            token: SelectorToken::from(token),
            factors: factors
                .iter()
                .map(|(parameter, factor)| SelectorFactor {
                    parameter: parameter.clone(),
                    factor: *factor,
                })
                .collect(),
        });
        self
    }

    #[must_use]
    pub fn outcome(mut self, name: QuantityRef, intercept: f64, terms: &[(QuantityRef, f64)]) -> Self {
        self.outcomes.push(OutcomeDef {
            name,
            intercept,
            terms: terms
                .iter()
                .map(|(parameter, coefficient)| Term {
                    parameter: parameter.clone(),
                    coefficient: *coefficient,
                })
                .collect(),
            growth: 0.0,
        });
        self
    }

    /// Set the per-period growth of the most recently added outcome
    #[must_use]
    pub fn growth(mut self, growth: f64) -> Self {
        if let Some(last) = self.outcomes.last_mut() {
            last.growth = growth;
        }
        self
    }

    #[must_use]
    pub fn noise(mut self, std_dev: f64, seed: u64) -> Self {
        self.noise = Some(NoiseConfig { std_dev, seed });
        self
    }

    /// Check the definition for internal consistency
    pub fn validate(&self) -> Result<(), LinearModelError> {
        if self.horizon == 0 {
            return Err(LinearModelError::ZeroHorizon);
        }

        let mut names = FxHashSet::default();
        for def in &self.parameters {
            if def.name.is_dataset() {
                return Err(LinearModelError::DatasetParameter(def.name.clone()));
            }
            if !names.insert(&def.name) {
                return Err(LinearModelError::DuplicateParameter(def.name.clone()));
            }
            if !def.is_feasible(def.value) {
                return Err(LinearModelError::InfeasibleBase {
                    parameter: def.name.clone(),
                    value: def.value,
                });
            }
        }

        let mut tokens = FxHashSet::default();
        for selector in &self.selectors {
            if !tokens.insert(&selector.token) {
                return Err(LinearModelError::DuplicateSelector(selector.token.clone()));
            }
            for factor in &selector.factors {
                if !names.contains(&factor.parameter) {
                    return Err(LinearModelError::UnknownParameter {
                        owner: format!("selector '{}'", selector.token),
                        parameter: factor.parameter.clone(),
                    });
                }
            }
        }

        let mut outcomes = FxHashSet::default();
        for outcome in &self.outcomes {
            if !outcomes.insert(&outcome.name) {
                return Err(LinearModelError::DuplicateOutcome(outcome.name.clone()));
            }
            for term in &outcome.terms {
                if !names.contains(&term.parameter) {
                    return Err(LinearModelError::UnknownParameter {
                        owner: format!("outcome {}", outcome.name),
                        parameter: term.parameter.clone(),
                    });
                }
            }
        }

        if let Some(noise) = &self.noise
            && !(noise.std_dev.is_finite() && noise.std_dev >= 0.0)
        {
            return Err(LinearModelError::InvalidNoise(noise.std_dev));
        }

        Ok(())
    }

    fn parameter_def(&self, name: &QuantityRef) -> Option<&ParameterDef> {
        self.parameters.iter().find(|def| &def.name == name)
    }

    fn outcome_def(&self, name: &QuantityRef) -> Option<&OutcomeDef> {
        self.outcomes.iter().find(|def| &def.name == name)
    }

    fn noise_samples(&self) -> Result<Option<Vec<f64>>, SolveFailure> {
        let Some(noise) = self.noise else {
            return Ok(None);
        };
        let dist = Normal::new(0.0, noise.std_dev)
            .map_err(|e| SolveFailure::Solver(format!("invalid noise distribution: {e}")))?;
        let mut rng = StdRng::seed_from_u64(noise.seed);
        Ok(Some((0..self.horizon).map(|_| dist.sample(&mut rng)).collect()))
    }
}

impl ModelBackend for LinearModel {
    type Variant = LinearVariant;

    fn resolve_parameter(&self, reference: &QuantityRef) -> Result<(), String> {
        if reference.is_dataset() {
            return Err("dataset selectors cannot be perturbed".to_string());
        }
        self.parameter_def(reference)
            .map(|_| ())
            .ok_or_else(|| "no such parameter".to_string())
    }

    fn resolve_outcome(&self, reference: &QuantityRef) -> Result<(), String> {
        self.outcome_def(reference)
            .map(|_| ())
            .ok_or_else(|| "no such outcome".to_string())
    }

    fn scenario_selectors(&self) -> Vec<SelectorToken> {
        self.selectors.iter().map(|s| s.token.clone()).collect()
    }

    fn build_variant(&self, spec: &VariantSpec) -> Result<LinearVariant, SolveFailure> {
        let mut values: FxHashMap<QuantityRef, f64> = self
            .parameters
            .iter()
            .map(|def| (def.name.clone(), def.value))
            .collect();

        for token in &spec.selectors {
            let selector = self
                .selectors
                .iter()
                .find(|s| &s.token == token)
                .ok_or_else(|| SolveFailure::Variant(format!("unknown selector '{token}'")))?;
            for factor in &selector.factors {
                if let Some(value) = values.get_mut(&factor.parameter) {
                    *value *= factor.factor;
                }
            }
        }

        if let Some(perturbation) = &spec.perturbation {
            let value = values.get_mut(&perturbation.parameter).ok_or_else(|| {
                SolveFailure::Variant(format!("unknown parameter {}", perturbation.parameter))
            })?;
            *value = perturbation.apply(*value);
        }

        Ok(LinearVariant { values })
    }

    fn solve(
        &self,
        variant: &LinearVariant,
        outcomes: &[QuantityRef],
    ) -> Result<Vec<TimeSeries>, SolveFailure> {
        for def in &self.parameters {
            let value = variant.values.get(&def.name).copied().unwrap_or(def.value);
            if !def.is_feasible(value) {
                return Err(SolveFailure::Infeasible(format!(
                    "{} = {value} violates its bounds",
                    def.name
                )));
            }
        }

        let noise = self.noise_samples()?;

        outcomes
            .iter()
            .map(|name| {
                let def = self
                    .outcome_def(name)
                    .ok_or_else(|| SolveFailure::MissingOutcome(name.to_string()))?;
                let level = def.terms.iter().try_fold(def.intercept, |acc, term| {
                    variant
                        .values
                        .get(&term.parameter)
                        .map(|value| acc + term.coefficient * value)
                        .ok_or_else(|| {
                            SolveFailure::Solver(format!("unbound parameter {}", term.parameter))
                        })
                })?;

                let series = (0..self.horizon)
                    .map(|t| {
                        let compounded = level * (1.0 + def.growth).powi(t as i32);
                        compounded + noise.as_ref().map_or(0.0, |n| n[t])
                    })
                    .collect();
                Ok(series)
            })
            .collect()
    }
}
