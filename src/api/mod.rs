//! API layer -- read-only status routes.

mod routes;
pub mod state;

use self::state::AppState;
use axum::Router;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .with_state(state)
}

/// Serve the status API until the process exits.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
