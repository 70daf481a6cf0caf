use serde::Serialize;
use vigil_notify::CallAttempt;

use crate::request::RunReport;

/// Escalation counters, shared between the gate, the dial worker and readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationMetrics {
    /// Conditions accepted by `submit`.
    pub submitted: u64,
    /// Conditions that passed the cooldown gate.
    pub escalated: u64,
    /// Conditions dropped inside an active cooldown window.
    pub suppressed: u64,
    /// Escalations recorded with no contacts to call.
    pub skipped_no_contacts: u64,
    /// Pending runs evicted from a full queue.
    pub overflowed: u64,
    pub runs_completed: u64,
    /// Runs in which no recipient was reached.
    pub runs_fully_failed: u64,
    pub attempts_completed: u64,
    pub attempts_failed: u64,
    /// Runs queued behind the dial worker right now.
    pub pending_runs: usize,
}

impl EscalationMetrics {
    pub fn record_attempt(&mut self, attempt: &CallAttempt) {
        if attempt.is_completed() {
            self.attempts_completed += 1;
        } else {
            self.attempts_failed += 1;
        }
    }

    pub fn record_run(&mut self, report: &RunReport) {
        self.runs_completed += 1;
        if report.fully_failed() {
            self.runs_fully_failed += 1;
        }
    }
}
