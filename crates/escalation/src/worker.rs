//! Dial worker: drains the run queue one run at a time through the only
//! call transport.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

use vigil_notify::{CallAttempt, CallDialer, CallState};
use vigil_rules::{AuditLog, EscalationPhase, LogLevel};

use crate::metrics::EscalationMetrics;
use crate::queue::RunQueue;
use crate::request::{CallRun, RunReport};

pub struct DialWorker {
    dialer: CallDialer,
    queue: Arc<RunQueue>,
    metrics: Arc<RwLock<EscalationMetrics>>,
    audit: AuditLog,
    reports: broadcast::Sender<RunReport>,
}

impl DialWorker {
    pub fn new(
        dialer: CallDialer,
        queue: Arc<RunQueue>,
        metrics: Arc<RwLock<EscalationMetrics>>,
        audit: AuditLog,
        reports: broadcast::Sender<RunReport>,
    ) -> Self {
        Self {
            dialer,
            queue,
            metrics,
            audit,
            reports,
        }
    }

    /// Execute runs in FIFO order until the queue closes, or until shutdown
    /// stops the worker between runs.
    pub async fn run(mut self) {
        info!(transport = %self.dialer.transport_name(), "dial worker started");

        while let Some(run) = self.queue.pop().await {
            if self.dialer.shutdown_requested() {
                warn!(seq = run.seq, pending = self.queue.len() + 1, "shutdown with pending call runs, not dialing");
                break;
            }
            let report = self.execute(run).await;
            // Nobody listening is fine.
            let _ = self.reports.send(report);
        }

        info!("dial worker stopped");
    }

    pub async fn execute(&mut self, run: CallRun) -> RunReport {
        let label = run.key.to_string();
        let seq = run.seq;
        let queued_for = run.enqueued_at.elapsed();
        {
            let pending = self.queue.len();
            self.metrics.write().expect("metrics lock poisoned").pending_runs = pending;
        }

        info!(
            seq,
            run_id = %run.id,
            key = %label,
            recipients = run.recipients.len(),
            queued_ms = queued_for.as_millis() as u64,
            "call run started"
        );

        let started_at = Instant::now();
        let metrics = &self.metrics;
        let audit = &self.audit;
        let attempts = self
            .dialer
            .call_all(&run.recipients, |attempt| {
                metrics
                    .write()
                    .expect("metrics lock poisoned")
                    .record_attempt(attempt);
                audit_attempt(audit, &label, seq, attempt);
            })
            .await;

        let report = RunReport {
            run_id: run.id,
            seq,
            skipped: run.recipients.len() - attempts.len(),
            key: run.key,
            condition: run.condition,
            attempts,
            started_at,
            finished_at: Instant::now(),
        };

        self.metrics
            .write()
            .expect("metrics lock poisoned")
            .record_run(&report);

        if report.fully_failed() {
            error!(
                seq,
                key = %label,
                recipients = report.attempts.len(),
                "call run failed: no recipient reached"
            );
            self.audit.log(
                &label,
                Some(seq),
                LogLevel::Error,
                EscalationPhase::Failure,
                "no recipient reached",
            );
        } else {
            info!(
                seq,
                key = %label,
                completed = report.completed(),
                failed = report.failed(),
                skipped = report.skipped,
                elapsed_ms = report.elapsed().as_millis() as u64,
                "call run finished"
            );
            self.audit.log(
                &label,
                Some(seq),
                LogLevel::Info,
                EscalationPhase::Complete,
                format!(
                    "run finished: {} completed, {} failed, {} skipped",
                    report.completed(),
                    report.failed(),
                    report.skipped
                ),
            );
        }

        report
    }
}

/// Record one finished attempt under the phase it ended in.
fn audit_attempt(audit: &AuditLog, key: &str, seq: u64, attempt: &CallAttempt) {
    let details = serde_json::to_value(attempt).ok();
    if attempt.is_completed() {
        audit.log_with_details(
            key,
            Some(seq),
            LogLevel::Info,
            EscalationPhase::Complete,
            format!("{} called", attempt.recipient),
            details,
        );
        return;
    }

    // State reached just before Failed.
    let last_live = attempt
        .transitions
        .iter()
        .rev()
        .find(|s| !s.is_terminal())
        .copied()
        .unwrap_or(CallState::Idle);
    let phase = match last_live {
        CallState::Holding => EscalationPhase::Hold,
        CallState::HangingUp => EscalationPhase::Hangup,
        _ => EscalationPhase::Dial,
    };
    let reason = attempt
        .outcome
        .as_ref()
        .map(|o| format!("{o:?}"))
        .unwrap_or_default();
    audit.log_with_details(
        key,
        Some(seq),
        LogLevel::Warning,
        phase,
        format!("{} failed: {reason}", attempt.recipient),
        details,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use vigil_core::AlertCondition;
    use vigil_notify::mock::{MockBehavior, MockTransport};
    use vigil_notify::DialTimings;
    use vigil_rules::LogQueryParams;

    use crate::request::EscalationRequest;

    fn worker(transport: MockTransport) -> (DialWorker, Arc<RwLock<EscalationMetrics>>, AuditLog) {
        let metrics = Arc::new(RwLock::new(EscalationMetrics::default()));
        let audit = AuditLog::new();
        let (reports, _) = broadcast::channel(8);
        let dialer = CallDialer::without_shutdown(Box::new(transport), DialTimings::default());
        let worker = DialWorker::new(
            dialer,
            Arc::new(RunQueue::new(4)),
            metrics.clone(),
            audit.clone(),
            reports,
        );
        (worker, metrics, audit)
    }

    fn run(recipients: &[&str]) -> CallRun {
        let request = EscalationRequest {
            seq: 1,
            condition: AlertCondition::fall_detected(0.9, Utc::now()),
            received_at: Instant::now(),
        };
        CallRun::new(request, recipients.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn records_attempt_metrics_and_audit() {
        let transport =
            MockTransport::acking().with_dial("222", MockBehavior::Reject("NO CARRIER".to_string()));
        let (mut worker, metrics, audit) = worker(transport);

        let report = worker.execute(run(&["111", "222"])).await;

        assert_eq!(report.completed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.fully_failed());
        assert_eq!(report.elapsed(), Duration::from_secs(15));

        let m = metrics.read().unwrap().clone();
        assert_eq!((m.attempts_completed, m.attempts_failed, m.runs_completed), (1, 1, 1));

        let dial_failures = audit.query(
            "vision",
            &LogQueryParams {
                phase: Some(EscalationPhase::Dial),
                ..Default::default()
            },
        );
        assert_eq!(dial_failures.len(), 1);
        assert!(dial_failures[0].message.starts_with("222 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_run_counts_as_fully_failed() {
        let (mut worker, metrics, audit) = worker(MockTransport::never_responding());

        let report = worker.execute(run(&["111", "222"])).await;

        assert!(report.fully_failed());
        assert_eq!(report.elapsed(), Duration::from_secs(12));
        assert_eq!(metrics.read().unwrap().runs_fully_failed, 1);
        let errors = audit.query(
            "vision",
            &LogQueryParams {
                level: Some(LogLevel::Error),
                ..Default::default()
            },
        );
        assert_eq!(errors.len(), 1);
    }
}
