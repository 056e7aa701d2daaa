//! Cooldown gate for remediation actions.
//!
//! The [`CooldownGate`] guarantees that two granted actions are never closer
//! together than the configured minimum interval, however often the detector
//! fires. The check and the update of the last-action time happen under the
//! same lock, so concurrent callers cannot both be granted.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct CooldownGate {
    min_interval: Duration,
    last_action: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_action: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Grant an action at `now` if the cooldown has elapsed, recording `now`
    /// as the last action time. A denied call leaves the state untouched.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let mut last = self.last_action.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            let elapsed = now.saturating_duration_since(prev);
            if elapsed < self.min_interval {
                debug!(
                    elapsed_sec = elapsed.as_secs_f64(),
                    cooldown_sec = self.min_interval.as_secs_f64(),
                    "cooldown not elapsed"
                );
                return false;
            }
        }
        *last = Some(now);
        true
    }

    /// Time left until the gate would grant again.
    pub fn remaining(&self, now: Instant) -> Duration {
        let last = self.last_action.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(prev) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(prev)),
            None => Duration::ZERO,
        }
    }

    pub fn last_action(&self) -> Option<Instant> {
        *self.last_action.lock().unwrap_or_else(|e| e.into_inner())
    }
}
