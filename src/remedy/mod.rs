//! Remediation executors.
//!
//! An executor performs one bounded, idempotent corrective action against a
//! named target and reports what happened. It never returns an error: a
//! missing backend is an [`RemediationOutcome::Unavailable`] outcome so the
//! caller can still notify the operator.

pub mod docker;

pub use docker::DockerRestart;

use serde::{Deserialize, Serialize};

/// Result of a remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RemediationOutcome {
    Succeeded(String),
    Failed(String),
    /// No execution capability (daemon down, CLI missing, ...).
    Unavailable(String),
    /// Remediation is disabled; the incident is diagnose-only.
    Skipped,
}

impl RemediationOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RemediationOutcome::Succeeded(_))
    }

    pub fn detail(&self) -> &str {
        match self {
            RemediationOutcome::Succeeded(d)
            | RemediationOutcome::Failed(d)
            | RemediationOutcome::Unavailable(d) => d,
            RemediationOutcome::Skipped => "remediation disabled",
        }
    }
}

impl std::fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RemediationOutcome::Succeeded(_) => "SUCCESS",
            RemediationOutcome::Failed(_) => "FAILED",
            RemediationOutcome::Unavailable(_) => "UNAVAILABLE",
            RemediationOutcome::Skipped => "SKIPPED",
        };
        write!(f, "{}: {}", label, self.detail())
    }
}

/// Trait for corrective actions.
#[async_trait::async_trait]
pub trait RemediationExecutor: Send + Sync {
    /// Bring `target` back to a healthy state. Must be safe to repeat.
    async fn execute(&self, target: &str) -> RemediationOutcome;
}

/// Executor used in diagnose-only mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disabled;

#[async_trait::async_trait]
impl RemediationExecutor for Disabled {
    async fn execute(&self, _target: &str) -> RemediationOutcome {
        RemediationOutcome::Skipped
    }
}
