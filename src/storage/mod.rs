//! SQLite storage for the observation dataset.
//!
//! Every observation the loop sees is written with a binary label so the
//! history can later be used to tune thresholds or train a better model.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde::Serialize;

use crate::detect::Observation;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// A stored dataset row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRow {
    pub id: i64,
    pub value: f64,
    pub label: bool,
    pub sourced: bool,
    pub created_at: DateTime<Utc>,
}

/// Save an observation with its label.
pub fn save_observation(pool: &Pool, obs: &Observation, label: bool) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO observations (value, label, sourced, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![obs.value, label, obs.sourced, obs.timestamp.to_rfc3339()],
    )?;
    Ok(())
}

/// The newest `limit` observations, newest first.
pub fn recent_observations(pool: &Pool, limit: usize) -> Result<Vec<ObservationRow>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, value, label, sourced, created_at FROM observations
         ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, f64>(1)?,
            row.get::<_, bool>(2)?,
            row.get::<_, bool>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for r in rows {
        let (id, value, label, sourced, created_at) = r?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .with_context(|| format!("bad timestamp on observation {}", id))?
            .with_timezone(&Utc);
        out.push(ObservationRow {
            id,
            value,
            label,
            sourced,
            created_at,
        });
    }
    Ok(out)
}

/// Records observations off the async runtime.
#[derive(Clone)]
pub struct ObservationStore {
    pool: Pool,
    label_threshold: f64,
}

impl ObservationStore {
    pub fn new(pool: Pool, label_threshold: f64) -> Self {
        Self {
            pool,
            label_threshold,
        }
    }

    pub fn label(&self, obs: &Observation) -> bool {
        obs.value > self.label_threshold
    }

    pub async fn record(&self, obs: Observation) -> Result<()> {
        let pool = self.pool.clone();
        let label = self.label(&obs);
        tokio::task::spawn_blocking(move || save_observation(&pool, &obs, label)).await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_read_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pool = open_pool(&dir.path().join("data/sentinel.db"))?;
        let store = ObservationStore::new(pool.clone(), 50.0);

        store.record(Observation::new(12.5)).await?;
        store.record(Observation::new(88.0)).await?;
        store.record(Observation::fallback(0.0)).await?;

        let rows = recent_observations(&pool, 10)?;
        assert_eq!(rows.len(), 3);

        // Newest first.
        assert_eq!(rows[0].value, 0.0);
        assert!(!rows[0].sourced);
        assert!(!rows[0].label);

        assert_eq!(rows[1].value, 88.0);
        assert!(rows[1].label);
        assert!(rows[1].sourced);

        assert_eq!(rows[2].value, 12.5);
        assert!(!rows[2].label);

        assert_eq!(recent_observations(&pool, 1)?.len(), 1);
        Ok(())
    }
}
