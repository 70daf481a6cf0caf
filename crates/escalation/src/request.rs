use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use vigil_core::{AlertCondition, CooldownKey};
use vigil_notify::{CallAttempt, CallOutcome};

/// A danger condition waiting for the cooldown gate.
#[derive(Debug, Clone)]
pub struct EscalationRequest {
    pub seq: u64,
    pub condition: AlertCondition,
    /// When `submit` was called; cooldown windows are measured from here.
    pub received_at: Instant,
}

/// One escalation promoted past the cooldown gate, waiting for the dial worker.
#[derive(Debug, Clone)]
pub struct CallRun {
    pub id: Uuid,
    pub seq: u64,
    pub key: CooldownKey,
    pub condition: AlertCondition,
    /// Contact list as it was when the run was enqueued.
    pub recipients: Arc<[String]>,
    pub enqueued_at: Instant,
}

impl CallRun {
    pub fn new(request: EscalationRequest, recipients: Arc<[String]>) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq: request.seq,
            key: request.condition.cooldown_key(),
            condition: request.condition,
            recipients,
            enqueued_at: Instant::now(),
        }
    }
}

/// Result of executing one call run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub seq: u64,
    pub key: CooldownKey,
    pub condition: AlertCondition,
    /// Attempts in dial order.
    pub attempts: Vec<CallAttempt>,
    /// Recipients never dialed because shutdown arrived first.
    pub skipped: usize,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl RunReport {
    pub fn elapsed(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    pub fn recipients(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.recipient.as_str()).collect()
    }

    pub fn completed(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempts.iter().filter(|a| a.is_failed()).count()
    }

    /// Every recipient was tried and none was reached.
    pub fn fully_failed(&self) -> bool {
        !self.attempts.is_empty() && self.completed() == 0 && !self.interrupted()
    }

    pub fn interrupted(&self) -> bool {
        self.skipped > 0
            || self
                .attempts
                .iter()
                .any(|a| a.outcome == Some(CallOutcome::Interrupted))
    }
}
