//! Diagnostic text generation for anomalies.
//!
//! Backends implement [`DiagnosticOracle`] and may fail freely. The control
//! loop only ever talks to [`Diagnostics`], which bounds each call with a hard
//! timeout and turns every failure into [`PLACEHOLDER`], so a slow or broken
//! oracle can never hold up remediation or notification.

pub mod chat;

pub use chat::ChatCompletionOracle;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Text used whenever no diagnosis could be produced.
pub const PLACEHOLDER: &str = "diagnostic unavailable";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("oracle returned {status}")]
    Status { status: u16 },
    #[error("oracle response had no choices")]
    Empty,
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
}

/// Backend producing a free-text explanation for an anomalous value.
#[async_trait::async_trait]
pub trait DiagnosticOracle: Send + Sync {
    async fn diagnose(&self, value: f64) -> Result<String, OracleError>;
}

/// Timeout-bounded, infallible front for an optional oracle.
#[derive(Clone)]
pub struct Diagnostics {
    oracle: Option<Arc<dyn DiagnosticOracle>>,
    timeout: Duration,
}

impl Diagnostics {
    pub fn new(oracle: Arc<dyn DiagnosticOracle>, timeout: Duration) -> Self {
        Self {
            oracle: Some(oracle),
            timeout,
        }
    }

    /// No oracle configured; every explanation is the placeholder.
    pub fn disabled() -> Self {
        Self {
            oracle: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn explain(&self, value: f64) -> String {
        let Some(oracle) = &self.oracle else {
            return PLACEHOLDER.to_string();
        };

        let result = match tokio::time::timeout(self.timeout, oracle.diagnose(value)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        };

        match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!(value, "oracle returned blank diagnosis");
                PLACEHOLDER.to_string()
            }
            Err(e) => {
                warn!(value, error = %e, "diagnosis unavailable");
                PLACEHOLDER.to_string()
            }
        }
    }
}
