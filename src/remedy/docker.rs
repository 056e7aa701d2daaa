use std::time::Duration;

use tracing::{info, warn};

use super::{RemediationExecutor, RemediationOutcome};
use crate::config::RemediationConfig;

/// Daemon-side failures that mean "no execution capability" rather than a
/// failed restart.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "permission denied while trying to connect",
    "error during connect",
];

/// Restarts a container through the docker CLI.
///
/// `docker restart` starts a stopped container and restarts a running one,
/// so repeating the action is harmless.
pub struct DockerRestart {
    docker_bin: String,
    grace_sec: u64,
    timeout: Duration,
}

impl DockerRestart {
    pub fn new(docker_bin: impl Into<String>, grace_sec: u64, timeout: Duration) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            grace_sec,
            timeout,
        }
    }

    pub fn from_config(config: &RemediationConfig) -> Self {
        Self::new(&config.docker_bin, config.grace_sec, config.timeout())
    }

    /// Check if the docker CLI can be spawned at all.
    pub async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.docker_bin)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .is_ok()
    }
}

#[async_trait::async_trait]
impl RemediationExecutor for DockerRestart {
    async fn execute(&self, target: &str) -> RemediationOutcome {
        let mut cmd = tokio::process::Command::new(&self.docker_bin);
        cmd.arg("restart")
            .arg("--time")
            .arg(self.grace_sec.to_string())
            .arg(target)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                warn!(container = %target, timeout_sec = self.timeout.as_secs_f64(), "container restart timed out");
                return RemediationOutcome::Failed(format!(
                    "restart of '{}' timed out after {:.1}s",
                    target,
                    self.timeout.as_secs_f64()
                ));
            }
            Ok(Err(e)) => {
                warn!(container = %target, bin = %self.docker_bin, error = %e, "docker CLI could not be spawned");
                return RemediationOutcome::Unavailable(format!("docker CLI unavailable: {}", e));
            }
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            info!(container = %target, "container restarted");
            return RemediationOutcome::Succeeded(format!("restarted '{}'", target));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
            warn!(container = %target, %stderr, "docker daemon unavailable");
            return RemediationOutcome::Unavailable(stderr);
        }

        warn!(container = %target, status = ?output.status.code(), %stderr, "container restart failed");
        RemediationOutcome::Failed(if stderr.is_empty() {
            format!("docker exited with {}", output.status)
        } else {
            stderr
        })
    }
}
