//! Metric sources feeding the control loop.

pub mod prometheus;

pub use prometheus::PrometheusSource;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("metrics request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metrics endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("query returned no samples")]
    Empty,
    #[error("malformed metrics response: {0}")]
    Malformed(String),
    #[error("metric value {0} is not finite")]
    NonFinite(f64),
    #[error("metrics request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Pull-based provider of a single scalar metric.
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch the current value.
    async fn pull(&self) -> Result<f64, SourceError>;
}
