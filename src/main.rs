use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use sentinel::config::{ConfigError, SentinelConfig};
use sentinel::detect::IncidentLog;
use sentinel::source::{MetricSource, PrometheusSource};

#[derive(Parser)]
#[command(
    name = "sentinel",
    about = "Drift-gated self-healing monitor for containerized services",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, short, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (warm-up, watch loop, optional status API)
    Run,

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Pull a single value from the metric source
    Probe,

    /// Show recorded incidents, newest first
    Incidents {
        /// Maximum number of incidents to show
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show recorded observations from the dataset, newest first
    Observations {
        /// Maximum number of rows to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "sentinel failed");
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve, overlay env credentials and validate.
fn load_config(path: Option<&std::path::Path>) -> Result<SentinelConfig, ConfigError> {
    let config = SentinelConfig::resolve(path)?.with_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn dispatch(cli: Cli) -> Result<()> {
    let path = cli.config.as_deref();
    match cli.command {
        Commands::Run => {
            let config = load_config(path)?;
            tracing::info!(
                source = %config.source.url,
                container = %config.remediation.target,
                "Starting sentinel daemon"
            );
            sentinel::serve(config).await?;
        }
        Commands::CheckConfig => {
            let config = load_config(path)?;
            println!("configuration OK");
            println!("  source:      {} ({})", config.source.url, config.source.metric_name);
            println!(
                "  thresholds:  floor {} / ceiling {}",
                config.detector.floor, config.detector.ceiling
            );
            println!(
                "  remediation: {}",
                if config.remediation.enabled {
                    config.remediation.target.as_str()
                } else {
                    "disabled"
                }
            );
            println!("  oracle:      {}", if config.oracle.enabled { "enabled" } else { "disabled" });
        }
        Commands::Probe => {
            // Probing needs no credentials, so skip validation.
            let config = SentinelConfig::resolve(path)?.with_env_overrides();
            let source = PrometheusSource::new(&config.source)?;
            let value = source.pull().await?;
            println!("{}: {:.2}{}", config.source.metric_name, value, config.source.unit);
        }
        Commands::Incidents { limit, json } => {
            let config = SentinelConfig::resolve(path)?;
            let log = IncidentLog::new(&config.history.incident_path);
            let records = log.recent(limit).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No incidents recorded.");
            } else {
                for r in &records {
                    let trigger = r.trigger.map(|t| t.to_string()).unwrap_or_default();
                    println!(
                        "{}  {:>8.2}  {:<20}  {}",
                        r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        r.trigger_value,
                        trigger,
                        r.remediation_outcome
                    );
                }
            }
        }
        Commands::Observations { limit } => {
            let config = SentinelConfig::resolve(path)?;
            let Some(db_path) = config.storage.db_path.as_deref() else {
                println!("Observation dataset is disabled.");
                return Ok(());
            };
            let pool = sentinel::storage::open_pool(db_path)?;
            let rows = tokio::task::spawn_blocking(move || {
                sentinel::storage::recent_observations(&pool, limit)
            })
            .await??;
            println!("{:<25} {:>10} {:>6} {:>8}", "TIMESTAMP", "VALUE", "LABEL", "SOURCED");
            for row in rows {
                println!(
                    "{:<25} {:>10.2} {:>6} {:>8}",
                    row.created_at.format("%Y-%m-%d %H:%M:%S"),
                    row.value,
                    u8::from(row.label),
                    row.sourced
                );
            }
        }
    }
    Ok(())
}
