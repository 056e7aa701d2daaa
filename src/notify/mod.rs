//! Operator notification sinks.
//!
//! Delivery is fire-and-forget: the control loop logs a failed send and moves
//! on, it never retries.

pub mod telegram;

pub use telegram::TelegramSink;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}
