//! Per-key cooldown windows for escalations.
//!
//! Tracks when each [`CooldownKey`] last escalated and decides whether a new
//! condition for the same key may escalate again. Times are monotonic
//! [`tokio::time::Instant`]s so paused-clock tests drive the windows.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use vigil_core::CooldownKey;

/// Result of checking a key against its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    /// Outside any window; the escalation was recorded.
    Escalate,
    /// Inside the window; nothing was recorded.
    Suppress { remaining: Duration },
}

pub struct CooldownTable {
    interval: Duration,
    last_escalation: HashMap<CooldownKey, Instant>,
}

impl CooldownTable {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_escalation: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left in `key`'s window at `now`, if it is still cooling down.
    pub fn remaining(&self, key: &CooldownKey, now: Instant) -> Option<Duration> {
        let last = self.last_escalation.get(key)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.interval).then(|| self.interval - elapsed)
    }

    /// Check `key` at `now`; records the escalation when the window is open.
    pub fn check_and_record(&mut self, key: &CooldownKey, now: Instant) -> CooldownDecision {
        if let Some(remaining) = self.remaining(key, now) {
            debug!(
                key = %key,
                "still in cooldown ({:.0}s remaining)",
                remaining.as_secs_f64()
            );
            return CooldownDecision::Suppress { remaining };
        }
        self.record_at(key.clone(), now);
        CooldownDecision::Escalate
    }

    /// Record an escalation for `key` at a specific instant.
    pub fn record_at(&mut self, key: CooldownKey, at: Instant) {
        self.last_escalation.insert(key, at);
    }

    pub fn last_escalation(&self, key: &CooldownKey) -> Option<Instant> {
        self.last_escalation.get(key).copied()
    }

    /// Forget keys whose windows have closed. Returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.last_escalation.len();
        let interval = self.interval;
        self.last_escalation
            .retain(|_, last| now.saturating_duration_since(*last) < interval);
        before - self.last_escalation.len()
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.last_escalation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_escalation.is_empty()
    }
}
