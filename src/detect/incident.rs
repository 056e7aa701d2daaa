//! Append-only incident history persisted as a JSON array.
//!
//! Every append re-reads the file, pushes the new record and rewrites the
//! whole array through a temporary file plus rename, so a crash mid-write
//! never leaves a truncated history behind. A missing or unparsable file is
//! treated as an empty history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::detect::{AnomalyVerdict, Trigger};
use crate::remedy::RemediationOutcome;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("incident history I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode incident history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A remediation episode, written once and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub trigger_value: f64,
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub diagnostic_text: String,
    pub remediation_outcome: RemediationOutcome,
}

impl IncidentRecord {
    pub fn new(
        verdict: &AnomalyVerdict,
        diagnostic_text: String,
        remediation_outcome: RemediationOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: verdict.observation.timestamp,
            trigger_value: verdict.observation.value,
            trigger: verdict.trigger,
            score: verdict.score,
            diagnostic_text,
            remediation_outcome,
        }
    }
}

/// Handle on the incident history file.
#[derive(Debug, Clone)]
pub struct IncidentLog {
    path: PathBuf,
}

impl IncidentLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full history, oldest first.
    pub async fn load(&self) -> Vec<IncidentRecord> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read incident history, starting empty");
                return Vec::new();
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Vec::new();
        }

        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "incident history is corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// The newest `limit` records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<IncidentRecord> {
        let mut records = self.load().await;
        records.reverse();
        records.truncate(limit);
        records
    }

    /// Append `record` and return the new history length.
    pub async fn append(&self, record: &IncidentRecord) -> Result<usize, HistoryError> {
        let mut records = self.load().await;
        records.push(record.clone());

        let encoded = serde_json::to_vec_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&tmp, &encoded).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        debug!(path = %self.path.display(), total = records.len(), "incident appended");
        Ok(records.len())
    }
}
