//! API route definitions.

use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;

const DEFAULT_INCIDENT_LIMIT: usize = 50;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/incidents", get(list_incidents))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.status.borrow().clone();
    Json(json!({
        "data": snapshot,
        "meta": { "timestamp": chrono::Utc::now().to_rfc3339() }
    }))
}

#[derive(Debug, Deserialize)]
struct IncidentQuery {
    limit: Option<usize>,
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(q): Query<IncidentQuery>,
) -> Json<Value> {
    let limit = q.limit.unwrap_or(DEFAULT_INCIDENT_LIMIT);
    let all = state.history.load().await;
    let total = all.len();
    let recent: Vec<_> = all.into_iter().rev().take(limit).collect();
    Json(json!({ "data": recent, "meta": { "total": total } }))
}
