//! Reducers that turn an outcome's time series into one scalar.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Summary statistic used to fill the value matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Statistic {
    #[default]
    Mean,
    Min,
    Max,
    /// Value in the first period
    Initial,
    /// Value in the last period
    Final,
    Sum,
}

impl Statistic {
    pub const ALL: [Statistic; 6] = [
        Self::Mean,
        Self::Min,
        Self::Max,
        Self::Initial,
        Self::Final,
        Self::Sum,
    ];

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mean => "Mean",
            Self::Min => "Minimum",
            Self::Max => "Maximum",
            Self::Initial => "Initial",
            Self::Final => "Final",
            Self::Sum => "Sum",
        }
    }

    /// Reduce a series. `None` for an empty series.
    #[must_use]
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        SeriesStats::from_values(values).map(|stats| stats.get(*self))
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "average" | "avg" => Ok(Self::Mean),
            "min" | "minimum" => Ok(Self::Min),
            "max" | "maximum" => Ok(Self::Max),
            "initial" | "first" => Ok(Self::Initial),
            "final" | "last" => Ok(Self::Final),
            "sum" | "total" => Ok(Self::Sum),
            other => Err(format!("unknown statistic '{other}'")),
        }
    }
}

/// Every statistic of one series, computed once when a run is recorded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub initial: f64,
    pub last: f64,
    pub sum: f64,
    pub len: usize,
}

impl SeriesStats {
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let (&initial, &last) = (values.first()?, values.last()?);
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            mean: sum / values.len() as f64,
            min,
            max,
            initial,
            last,
            sum,
            len: values.len(),
        })
    }

    #[must_use]
    pub fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Mean => self.mean,
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Initial => self.initial,
            Statistic::Final => self.last,
            Statistic::Sum => self.sum,
        }
    }
}
