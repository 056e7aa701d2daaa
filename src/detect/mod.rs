//! Drift detection and incident history.

pub mod baseline;
pub mod detector;
pub mod forest;
pub mod incident;

pub use baseline::Baseline;
pub use detector::DriftDetector;
pub use incident::{IncidentLog, IncidentRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
    #[error("non-finite observation {value} at index {index}")]
    NonFinite { index: usize, value: f64 },
    #[error("detector has not been trained")]
    NotReady,
}

/// One reading of the watched metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// `false` when the source failed and the fallback value was substituted.
    pub sourced: bool,
}

impl Observation {
    pub fn new(value: f64) -> Self {
        Self::at(Utc::now(), value)
    }

    pub fn at(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            sourced: true,
        }
    }

    /// Stand-in reading used while the metric source is unavailable.
    pub fn fallback(value: f64) -> Self {
        Self {
            sourced: false,
            ..Self::new(value)
        }
    }
}

/// Which rule flagged an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Statistical outlier above the floor threshold.
    Statistical,
    /// Above the ceiling threshold, regardless of the model.
    Ceiling,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Statistical => write!(f, "statistical outlier"),
            Trigger::Ceiling => write!(f, "ceiling exceeded"),
        }
    }
}

/// Classification of a single observation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyVerdict {
    pub observation: Observation,
    pub is_anomalous: bool,
    /// Isolation score; `None` when the model could not score the value.
    pub score: Option<f64>,
    /// Whether the model alone considered the value an outlier.
    pub statistical: bool,
    pub trigger: Option<Trigger>,
}
