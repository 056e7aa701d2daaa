//! TOML configuration for the Sentinel daemon.
//!
//! Configuration is resolved once at startup into an immutable
//! [`SentinelConfig`] and handed to the control loop. Resolution order for the
//! file is: explicit `--config` path, the `SENTINEL_CONFIG` environment
//! variable, `/etc/sentinel/sentinel.toml`, then compiled-in defaults.
//! Credentials can additionally be supplied through environment variables so
//! they never have to live in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SENTINEL_CONFIG";
/// Environment variable overriding `notify.telegram_token`.
pub const TELEGRAM_TOKEN_ENV: &str = "SENTINEL_TELEGRAM_TOKEN";
/// Environment variable overriding `notify.telegram_chat_id`.
pub const TELEGRAM_CHAT_ENV: &str = "SENTINEL_TELEGRAM_CHAT_ID";
/// Environment variable overriding `oracle.api_key`.
pub const ORACLE_KEY_ENV: &str = "SENTINEL_ORACLE_API_KEY";

const SYSTEM_CONFIG_PATH: &str = "/etc/sentinel/sentinel.toml";

/// Smallest baseline the isolation forest will accept.
pub const MIN_TRAINING_POINTS: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the sentinel process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default, rename = "loop")]
    pub cadence: CadenceConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl SentinelConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded sentinel configuration");
        Ok(config)
    }

    /// Resolve the configuration file.
    ///
    /// An explicitly requested file must load. A file named by
    /// `SENTINEL_CONFIG` must load as well, since silently ignoring it would
    /// run the daemon with settings the operator did not ask for.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&env_path));
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            return Self::load(system_path);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Overlay credentials from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay credentials using `lookup` to fetch variables by name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(TELEGRAM_TOKEN_ENV) {
            self.notify.telegram_token = Some(token);
        }
        if let Some(chat) = non_empty(TELEGRAM_CHAT_ENV) {
            self.notify.telegram_chat_id = Some(chat);
        }
        if let Some(key) = non_empty(ORACLE_KEY_ENV) {
            self.oracle.api_key = Some(key);
        }
        self
    }

    /// Check every setting the daemon cannot safely run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(&self.notify.telegram_token) {
            return Err(ConfigError::MissingCredential("notify.telegram_token"));
        }
        if is_blank(&self.notify.telegram_chat_id) {
            return Err(ConfigError::MissingCredential("notify.telegram_chat_id"));
        }
        if self.oracle.enabled && is_blank(&self.oracle.api_key) {
            return Err(ConfigError::MissingCredential("oracle.api_key"));
        }
        if self.remediation.enabled && self.remediation.target.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "remediation.target",
                reason: "remediation is enabled but no target container is named".to_string(),
            });
        }

        if !self.source.fallback_value.is_finite() {
            return Err(ConfigError::Invalid {
                field: "source.fallback_value",
                reason: "must be finite".to_string(),
            });
        }

        let d = &self.detector;
        if !d.floor.is_finite() || !d.ceiling.is_finite() {
            return Err(ConfigError::Invalid {
                field: "detector.floor/ceiling",
                reason: "thresholds must be finite".to_string(),
            });
        }
        if d.floor > d.ceiling {
            return Err(ConfigError::Invalid {
                field: "detector.floor",
                reason: format!("floor {} is above ceiling {}", d.floor, d.ceiling),
            });
        }
        if !(d.contamination > 0.0 && d.contamination <= 0.5) {
            return Err(ConfigError::Invalid {
                field: "detector.contamination",
                reason: format!("{} is outside (0, 0.5]", d.contamination),
            });
        }
        if d.min_training_points < MIN_TRAINING_POINTS {
            return Err(ConfigError::Invalid {
                field: "detector.min_training_points",
                reason: format!("must be at least {MIN_TRAINING_POINTS}"),
            });
        }
        if d.warmup_points < d.min_training_points {
            return Err(ConfigError::Invalid {
                field: "detector.warmup_points",
                reason: format!(
                    "{} is below min_training_points {}",
                    d.warmup_points, d.min_training_points
                ),
            });
        }
        if d.trees == 0 {
            return Err(ConfigError::Invalid {
                field: "detector.trees",
                reason: "at least one tree is required".to_string(),
            });
        }

        let c = &self.cadence;
        for (field, secs) in [
            ("loop.tick_interval_sec", c.tick_interval_sec),
            ("loop.cooling_interval_sec", c.cooling_interval_sec),
            ("source.timeout_sec", self.source.timeout_sec),
            ("oracle.timeout_sec", self.oracle.timeout_sec),
            ("remediation.timeout_sec", self.remediation.timeout_sec),
            ("notify.timeout_sec", self.notify.timeout_sec),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(bind) = &self.api.bind {
            if bind.parse::<std::net::SocketAddr>().is_err() {
                return Err(ConfigError::Invalid {
                    field: "api.bind",
                    reason: format!("{bind:?} is not a socket address"),
                });
            }
        }

        if !self.oracle.enabled {
            warn!("diagnostic oracle disabled; notifications will carry placeholder text");
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Metrics source
// ---------------------------------------------------------------------------

/// Prometheus query used to derive the watched metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the Prometheus server.
    pub url: String,
    /// Instant-vector PromQL expression; the first sample is used.
    pub query: String,
    pub timeout_sec: u64,
    /// Value substituted when the source is unreachable or returns nothing.
    pub fallback_value: f64,
    /// Human-readable metric name used in alerts and diagnosis prompts.
    pub metric_name: String,
    pub unit: String,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "http://prometheus:9090".to_string(),
            query: r#"100 - (avg by (instance) (irate(node_cpu_seconds_total{mode="idle"}[1m])) * 100)"#
                .to_string(),
            timeout_sec: 2,
            fallback_value: 0.0,
            metric_name: "CPU load".to_string(),
            unit: "%".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Isolation forest and threshold settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Observations collected during warm-up (and baseline window size).
    pub warmup_points: usize,
    /// Training is refused below this many points.
    pub min_training_points: usize,
    /// Expected share of outliers in the baseline, in (0, 0.5].
    pub contamination: f64,
    /// A statistical outlier must also exceed this value to count.
    pub floor: f64,
    /// Any value above this is anomalous regardless of the model.
    pub ceiling: f64,
    /// Number of isolation trees.
    pub trees: usize,
    /// RNG seed for reproducible forests.
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            warmup_points: 20,
            min_training_points: MIN_TRAINING_POINTS,
            contamination: 0.05,
            floor: 15.0,
            ceiling: 60.0,
            trees: 100,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Loop cadence
// ---------------------------------------------------------------------------

/// Tick cadences and the remediation cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Spacing between warm-up samples.
    pub warmup_interval_sec: u64,
    /// Normal watch cadence.
    pub tick_interval_sec: u64,
    /// Slower cadence used while cooling down after an incident.
    pub cooling_interval_sec: u64,
    /// Minimum spacing between two remediation actions.
    pub cooldown_sec: u64,
}

impl CadenceConfig {
    pub fn warmup_interval(&self) -> Duration {
        Duration::from_secs(self.warmup_interval_sec)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_sec)
    }

    pub fn cooling_interval(&self) -> Duration {
        Duration::from_secs(self.cooling_interval_sec)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_sec)
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            warmup_interval_sec: 1,
            tick_interval_sec: 3,
            cooling_interval_sec: 30,
            cooldown_sec: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Remediation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// `false` runs the daemon in diagnose-only mode.
    pub enabled: bool,
    /// Container name or id to restart.
    pub target: String,
    /// Path or bare name of the docker CLI.
    pub docker_bin: String,
    /// Seconds docker waits for a graceful stop before killing.
    pub grace_sec: u64,
    pub timeout_sec: u64,
}

impl RemediationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: "node_exporter".to_string(),
            docker_bin: "docker".to_string(),
            grace_sec: 10,
            timeout_sec: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic oracle
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completion endpoint used for diagnoses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    /// Full URL of the chat completions endpoint.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Sent as `HTTP-Referer`; some gateways require it.
    pub referer: Option<String>,
    pub timeout_sec: u64,
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "google/gemini-2.0-flash-exp:free".to_string(),
            api_key: None,
            referer: Some("http://sentinel".to_string()),
            timeout_sec: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Telegram Bot API base URL.
    pub telegram_api: String,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub timeout_sec: u64,
    /// Send an "online" message once warm-up completes.
    pub announce_startup: bool,
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_api: "https://api.telegram.org".to_string(),
            telegram_token: None,
            telegram_chat_id: None,
            timeout_sec: 5,
            announce_startup: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON file holding the incident history.
    pub incident_path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            incident_path: PathBuf::from("incident_history.json"),
        }
    }
}

/// Observation dataset recorded to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Unset disables recording.
    pub db_path: Option<PathBuf>,
    /// Observations above this value are labelled `1` in the dataset.
    pub label_threshold: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: Some(PathBuf::from("sentinel.db")),
            label_threshold: 50.0,
        }
    }
}

/// Read-only status API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Unset disables the API.
    pub bind: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn credentialed() -> SentinelConfig {
        let mut cfg = SentinelConfig::default();
        cfg.notify.telegram_token = Some("123:abc".to_string());
        cfg.notify.telegram_chat_id = Some("42".to_string());
        cfg.oracle.api_key = Some("sk-test".to_string());
        cfg
    }

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SentinelConfig::default();

        assert_eq!(cfg.source.url, "http://prometheus:9090");
        assert_eq!(cfg.source.fallback_value, 0.0);
        assert_eq!(cfg.detector.warmup_points, 20);
        assert_eq!(cfg.detector.contamination, 0.05);
        assert_eq!(cfg.detector.floor, 15.0);
        assert_eq!(cfg.detector.ceiling, 60.0);
        assert_eq!(cfg.cadence.tick_interval(), Duration::from_secs(3));
        assert_eq!(cfg.cadence.cooling_interval(), Duration::from_secs(30));
        assert_eq!(cfg.cadence.cooldown(), Duration::from_secs(300));
        assert!(cfg.remediation.enabled);
        assert_eq!(cfg.remediation.target, "node_exporter");
        assert_eq!(cfg.oracle.timeout(), Duration::from_secs(10));
        assert_eq!(cfg.notify.timeout(), Duration::from_secs(5));
        assert!(cfg.api.bind.is_none());
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[source]
url = "http://127.0.0.1:9090"
query = "node_load1"
fallback_value = -1.0

[detector]
warmup_points = 30
contamination = 0.1
floor = 20.0
ceiling = 90.0

[loop]
tick_interval_sec = 5
cooling_interval_sec = 60
cooldown_sec = 600

[remediation]
enabled = false
target = "web"

[oracle]
enabled = false

[notify]
telegram_token = "123:abc"
telegram_chat_id = "99"
announce_startup = false

[history]
incident_path = "/var/lib/sentinel/incidents.json"

[api]
bind = "127.0.0.1:7400"
"#;

        let cfg: SentinelConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.source.query, "node_load1");
        assert_eq!(cfg.source.fallback_value, -1.0);
        assert_eq!(cfg.source.timeout_sec, 2);
        assert_eq!(cfg.detector.warmup_points, 30);
        assert_eq!(cfg.detector.ceiling, 90.0);
        assert_eq!(cfg.detector.trees, 100);
        assert_eq!(cfg.cadence.cooldown_sec, 600);
        assert_eq!(cfg.cadence.warmup_interval_sec, 1);
        assert!(!cfg.remediation.enabled);
        assert!(!cfg.oracle.enabled);
        assert!(!cfg.notify.announce_startup);
        assert_eq!(
            cfg.history.incident_path,
            PathBuf::from("/var/lib/sentinel/incidents.json")
        );
        assert_eq!(cfg.api.bind.as_deref(), Some("127.0.0.1:7400"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let cfg: SentinelConfig = toml::from_str(include_str!("../deploy/sentinel.toml")).unwrap();
        let defaults = SentinelConfig::default();
        assert_eq!(cfg.source.query, defaults.source.query);
        assert_eq!(cfg.oracle.model, defaults.oracle.model);
        assert_eq!(cfg.detector.seed, defaults.detector.seed);
        assert_eq!(cfg.cadence.cooldown_sec, defaults.cadence.cooldown_sec);
        assert_eq!(cfg.api.bind.as_deref(), Some("127.0.0.1:9800"));
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: SentinelConfig = toml::from_str("").unwrap();
        let defaults = SentinelConfig::default();
        assert_eq!(cfg.detector.warmup_points, defaults.detector.warmup_points);
        assert_eq!(cfg.cadence.tick_interval_sec, defaults.cadence.tick_interval_sec);
        assert_eq!(cfg.remediation.target, defaults.remediation.target);
    }

    #[test]
    fn test_missing_telegram_credentials_are_fatal() {
        let cfg = SentinelConfig::default();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingCredential("notify.telegram_token"))
        ));

        let mut cfg = credentialed();
        cfg.notify.telegram_chat_id = Some("   ".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingCredential("notify.telegram_chat_id"))
        ));
    }

    #[test]
    fn test_oracle_key_only_required_when_enabled() {
        let mut cfg = credentialed();
        cfg.oracle.api_key = None;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingCredential("oracle.api_key"))
        ));

        cfg.oracle.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_threshold_and_interval_validation() {
        let mut cfg = credentialed();
        cfg.detector.floor = 80.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "detector.floor", .. })
        ));

        let mut cfg = credentialed();
        cfg.detector.contamination = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = credentialed();
        cfg.detector.warmup_points = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = credentialed();
        cfg.cadence.tick_interval_sec = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "loop.tick_interval_sec", .. })
        ));

        let mut cfg = credentialed();
        cfg.api.bind = Some("not-an-address".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_remediation_needs_target() {
        let mut cfg = credentialed();
        cfg.remediation.target = String::new();
        assert!(cfg.validate().is_err());

        cfg.remediation.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_replace_file_credentials() {
        let mut cfg = SentinelConfig::default();
        cfg.notify.telegram_token = Some("from-file".to_string());

        let cfg = cfg.with_overrides(|key| match key {
            TELEGRAM_TOKEN_ENV => Some("from-env".to_string()),
            TELEGRAM_CHAT_ENV => Some("7".to_string()),
            ORACLE_KEY_ENV => Some("".to_string()),
            _ => None,
        });

        assert_eq!(cfg.notify.telegram_token.as_deref(), Some("from-env"));
        assert_eq!(cfg.notify.telegram_chat_id.as_deref(), Some("7"));
        // Blank values never clobber.
        assert!(cfg.oracle.api_key.is_none());
    }

    #[test]
    fn test_load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            SentinelConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[detector\nfloor = ").unwrap();
        assert!(matches!(
            SentinelConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
