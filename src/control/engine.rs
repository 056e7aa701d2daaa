use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::SentinelConfig;
use crate::control::{message, Phase, StatusSnapshot, TickOutcome};
use crate::detect::{AnomalyVerdict, DetectError, DriftDetector, IncidentLog, IncidentRecord, Observation};
use crate::gate::CooldownGate;
use crate::notify::{NotificationSink, NotifyError};
use crate::oracle::Diagnostics;
use crate::remedy::{RemediationExecutor, RemediationOutcome};
use crate::source::{MetricSource, SourceError};
use crate::storage::ObservationStore;

/// External side-effect providers the loop drives.
pub struct Collaborators {
    pub source: Arc<dyn MetricSource>,
    pub executor: Arc<dyn RemediationExecutor>,
    pub diagnostics: Diagnostics,
    pub sink: Arc<dyn NotificationSink>,
}

/// The single stateful coordinator.
///
/// All writes to the detector baseline, the cooldown state and the incident
/// history happen from the task running this loop.
pub struct ControlLoop {
    config: Arc<SentinelConfig>,
    source: Arc<dyn MetricSource>,
    executor: Arc<dyn RemediationExecutor>,
    diagnostics: Diagnostics,
    sink: Arc<dyn NotificationSink>,
    detector: DriftDetector,
    gate: CooldownGate,
    history: IncidentLog,
    store: Option<ObservationStore>,
    phase: Phase,
    cooling_until: Option<Instant>,
    status: watch::Sender<StatusSnapshot>,
}

impl ControlLoop {
    pub fn new(config: Arc<SentinelConfig>, parts: Collaborators) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::starting());
        Self {
            detector: DriftDetector::new(config.detector.clone()),
            gate: CooldownGate::new(config.cadence.cooldown()),
            history: IncidentLog::new(&config.history.incident_path),
            source: parts.source,
            executor: parts.executor,
            diagnostics: parts.diagnostics,
            sink: parts.sink,
            store: None,
            phase: Phase::WarmingUp,
            cooling_until: None,
            status,
            config,
        }
    }

    /// Record every observation to the dataset store.
    pub fn with_store(mut self, store: ObservationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn detector(&self) -> &DriftDetector {
        &self.detector
    }

    pub fn history(&self) -> &IncidentLog {
        &self.history
    }

    /// Receiver for status snapshots, e.g. for the status API.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// Delay before the next tick: slower while cooling down.
    pub fn cadence(&self) -> Duration {
        match self.phase {
            Phase::Cooling => self.config.cadence.cooling_interval(),
            _ => self.config.cadence.tick_interval(),
        }
    }

    /// Collect the warm-up window and train the detector.
    ///
    /// On failure the loop stays in `WarmingUp` and must not be run further.
    pub async fn warm_up(&mut self) -> Result<(), DetectError> {
        let points = self.config.detector.warmup_points;
        info!(points, "learning baseline");

        let mut samples = Vec::with_capacity(points);
        for i in 0..points {
            if i > 0 {
                tokio::time::sleep(self.config.cadence.warmup_interval()).await;
            }
            let obs = self.observe().await;
            self.record(&obs).await;
            samples.push(obs);
        }

        self.detector.train(&samples)?;
        self.phase = Phase::Watching;
        self.publish(|s| s.phase = Phase::Watching);
        info!("detector trained, sentinel active");
        Ok(())
    }

    /// One watch iteration: observe, classify and, if permitted, remediate.
    pub async fn tick(&mut self) -> TickOutcome {
        let now = Instant::now();
        self.leave_cooling_if_elapsed(now);

        let obs = self.observe().await;
        self.record(&obs).await;

        let verdict = match self.detector.classify(&obs) {
            Ok(v) => v,
            Err(e) => {
                error!(value = obs.value, error = %e, "observation could not be classified");
                return TickOutcome::Unclassified;
            }
        };

        let cooldown_remaining = self.gate.remaining(now).as_secs();
        self.publish(|s| {
            s.last_observation = Some(obs);
            s.last_score = verdict.score;
            s.last_anomalous = verdict.is_anomalous;
            s.cooldown_remaining_sec = cooldown_remaining;
        });

        if !verdict.is_anomalous {
            return TickOutcome::Normal;
        }

        if !self.gate.try_acquire(now) {
            warn!(
                value = obs.value,
                trigger = ?verdict.trigger,
                remaining_sec = cooldown_remaining,
                "anomaly suppressed by cooldown"
            );
            self.publish(|s| s.suppressed += 1);
            return TickOutcome::Suppressed;
        }

        self.phase = Phase::Triggering;
        self.publish(|s| s.phase = Phase::Triggering);

        let record = self.trigger(&verdict).await;

        self.phase = Phase::Cooling;
        self.cooling_until = Some(now + self.gate.min_interval());
        let remaining = self.gate.remaining(Instant::now()).as_secs();
        self.publish(|s| {
            s.phase = Phase::Cooling;
            s.incidents += 1;
            s.cooldown_remaining_sec = remaining;
        });

        TickOutcome::Incident(Box::new(record))
    }

    /// Warm up, announce, then tick until `shutdown` resolves.
    ///
    /// Shutdown is only observed between ticks, so an incident in flight is
    /// always notified and recorded before the loop returns.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            res = self.warm_up() => {
                if let Err(e) = res {
                    error!(error = %e, "detector training failed");
                    return Err(anyhow::Error::new(e).context("detector training failed"));
                }
            }
            _ = &mut shutdown => {
                info!("shutdown requested during warm-up");
                return Ok(());
            }
        }

        if self.config.notify.announce_startup {
            let text = message::online(&self.config, self.detector.baseline());
            self.notify(&text).await;
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, leaving control loop");
                    break;
                }
                _ = tokio::time::sleep(self.cadence()) => {}
            }
            self.tick().await;
        }

        Ok(())
    }

    fn leave_cooling_if_elapsed(&mut self, now: Instant) {
        if self.phase != Phase::Cooling {
            return;
        }
        if self.cooling_until.map_or(true, |until| now >= until) {
            info!("cooldown elapsed, resuming normal cadence");
            self.phase = Phase::Watching;
            self.cooling_until = None;
            self.publish(|s| {
                s.phase = Phase::Watching;
                s.cooldown_remaining_sec = 0;
            });
        }
    }

    async fn observe(&self) -> Observation {
        let timeout = self.config.source.timeout();
        let result = match tokio::time::timeout(timeout, self.source.pull()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };

        match result {
            Ok(value) if value.is_finite() => Observation::new(value),
            Ok(value) => self.fallback(SourceError::NonFinite(value)),
            Err(e) => self.fallback(e),
        }
    }

    fn fallback(&self, e: SourceError) -> Observation {
        let fallback = self.config.source.fallback_value;
        warn!(error = %e, fallback, "metric source unavailable, substituting fallback");
        self.publish(|s| s.source_failures += 1);
        Observation::fallback(fallback)
    }

    async fn record(&self, obs: &Observation) {
        if let Some(store) = &self.store {
            if let Err(e) = store.record(*obs).await {
                warn!(error = %e, "failed to record observation");
            }
        }
    }

    async fn trigger(&self, verdict: &AnomalyVerdict) -> IncidentRecord {
        let value = verdict.observation.value;
        warn!(value, trigger = ?verdict.trigger, score = ?verdict.score, "anomaly detected");

        let (diagnostic, outcome) = tokio::join!(self.diagnostics.explain(value), self.remediate());

        let text = message::incident(
            &self.config,
            verdict,
            self.detector.baseline(),
            &diagnostic,
            &outcome,
        );
        self.notify(&text).await;

        let record = IncidentRecord::new(verdict, diagnostic, outcome);
        match self.history.append(&record).await {
            Ok(total) => info!(id = %record.id, total, "incident recorded"),
            Err(e) => error!(id = %record.id, error = %e, "failed to persist incident"),
        }
        record
    }

    async fn remediate(&self) -> RemediationOutcome {
        let cfg = &self.config.remediation;
        if !cfg.enabled {
            return RemediationOutcome::Skipped;
        }
        match tokio::time::timeout(cfg.timeout(), self.executor.execute(&cfg.target)).await {
            Ok(outcome) => {
                info!(container = %cfg.target, outcome = %outcome, "remediation finished");
                outcome
            }
            Err(_) => {
                warn!(container = %cfg.target, "remediation timed out");
                RemediationOutcome::Failed(format!(
                    "restart of '{}' timed out after {}s",
                    cfg.target, cfg.timeout_sec
                ))
            }
        }
    }

    async fn notify(&self, text: &str) {
        let timeout = self.config.notify.timeout();
        let result = match tokio::time::timeout(timeout, self.sink.send(text)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(timeout)),
        };
        if let Err(e) = result {
            warn!(error = %e, "notification failed");
        }
    }

    fn publish(&self, update: impl FnOnce(&mut StatusSnapshot)) {
        self.status.send_modify(update);
    }
}
