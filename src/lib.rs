//! Sentinel -- drift-gated self-healing monitor.
//!
//! This crate provides the core library for learning a metric baseline,
//! classifying new observations against it, and driving diagnosis,
//! remediation and operator notification when the metric drifts.

pub mod api;
pub mod config;
pub mod control;
pub mod detect;
pub mod gate;
pub mod notify;
pub mod oracle;
pub mod remedy;
pub mod source;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::SentinelConfig;
use crate::control::{Collaborators, ControlLoop};
use crate::notify::TelegramSink;
use crate::oracle::{ChatCompletionOracle, Diagnostics};
use crate::remedy::{DockerRestart, RemediationExecutor};
use crate::source::PrometheusSource;
use crate::storage::ObservationStore;

/// Wire up the production collaborators from a validated config.
pub async fn build_collaborators(config: &SentinelConfig) -> Result<Collaborators> {
    let source = PrometheusSource::new(&config.source).context("failed to build metric source")?;
    let sink = TelegramSink::new(&config.notify)?;

    let diagnostics = if config.oracle.enabled {
        let oracle =
            ChatCompletionOracle::new(&config.oracle, &config.source.metric_name, &config.source.unit)?;
        Diagnostics::new(Arc::new(oracle), config.oracle.timeout())
    } else {
        Diagnostics::disabled()
    };

    let executor: Arc<dyn RemediationExecutor> = if config.remediation.enabled {
        let docker = DockerRestart::from_config(&config.remediation);
        if !docker.is_available().await {
            tracing::warn!(bin = %config.remediation.docker_bin, "docker CLI not found, restarts will report unavailable");
        }
        Arc::new(docker)
    } else {
        Arc::new(remedy::Disabled)
    };

    Ok(Collaborators {
        source: Arc::new(source),
        executor,
        diagnostics,
        sink: Arc::new(sink),
    })
}

/// Start the sentinel daemon: dataset store, status API and control loop.
pub async fn serve(config: SentinelConfig) -> Result<()> {
    let config = Arc::new(config);
    let parts = build_collaborators(&config).await?;
    let mut control = ControlLoop::new(config.clone(), parts);

    if let Some(db_path) = &config.storage.db_path {
        tracing::info!(db_path = %db_path.display(), "Initializing observation dataset");
        let pool = storage::open_pool(db_path)?;
        control = control.with_store(ObservationStore::new(pool, config.storage.label_threshold));
    }

    if let Some(bind) = config.api.bind.clone() {
        let state = api::state::AppState {
            status: control.subscribe(),
            history: control.history().clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, state).await {
                tracing::error!(error = %e, "status API stopped");
            }
        });
    }

    control.run(shutdown_signal()).await
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
