//! The control loop: warm-up, watch, trigger, cool down.

pub mod engine;
pub mod message;

pub use engine::{Collaborators, ControlLoop};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detect::{IncidentRecord, Observation};

/// Where the loop currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    WarmingUp,
    Watching,
    Triggering,
    Cooling,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::WarmingUp => write!(f, "warming_up"),
            Phase::Watching => write!(f, "watching"),
            Phase::Triggering => write!(f, "triggering"),
            Phase::Cooling => write!(f, "cooling"),
        }
    }
}

/// What a single watch tick ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Normal,
    /// Anomalous, but the cooldown gate denied remediation.
    Suppressed,
    Incident(Box<IncidentRecord>),
    /// The observation could not be classified.
    Unclassified,
}

/// Read-only view of the loop published after every state change.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub last_observation: Option<Observation>,
    pub last_score: Option<f64>,
    pub last_anomalous: bool,
    pub cooldown_remaining_sec: u64,
    pub incidents: u64,
    pub suppressed: u64,
    pub source_failures: u64,
}

impl StatusSnapshot {
    pub fn starting() -> Self {
        Self {
            phase: Phase::WarmingUp,
            started_at: Utc::now(),
            last_observation: None,
            last_score: None,
            last_anomalous: false,
            cooldown_remaining_sec: 0,
            incidents: 0,
            suppressed: 0,
            source_failures: 0,
        }
    }
}
