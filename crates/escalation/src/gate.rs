//! Cooldown gate: the only owner of the cooldown table.
//!
//! Turns each [`EscalationRequest`] into either a suppression or a
//! [`CallRun`] on the run queue.

use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use vigil_core::{ContactList, VigilError};
use vigil_rules::{AuditLog, CooldownDecision, CooldownTable, EscalationPhase, LogLevel};

use crate::metrics::EscalationMetrics;
use crate::queue::RunQueue;
use crate::request::{CallRun, EscalationRequest};

/// Table size above which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 64;

/// What the gate did with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Enqueued { seq: u64 },
    Suppressed,
    NoContacts,
    /// Enqueued, but the queue was full and `dropped_seq` was evicted.
    Overflowed { seq: u64, dropped_seq: u64 },
}

pub struct Gate {
    cooldowns: CooldownTable,
    contacts: ContactList,
    queue: Arc<RunQueue>,
    metrics: Arc<RwLock<EscalationMetrics>>,
    audit: AuditLog,
}

impl Gate {
    pub fn new(
        cooldowns: CooldownTable,
        contacts: ContactList,
        queue: Arc<RunQueue>,
        metrics: Arc<RwLock<EscalationMetrics>>,
        audit: AuditLog,
    ) -> Self {
        Self {
            cooldowns,
            contacts,
            queue,
            metrics,
            audit,
        }
    }

    pub fn admit(&mut self, request: EscalationRequest) -> Admission {
        let key = request.condition.cooldown_key();
        let label = key.to_string();
        let seq = request.seq;

        if self.cooldowns.len() > PRUNE_THRESHOLD {
            self.cooldowns.prune(request.received_at);
        }

        if let CooldownDecision::Suppress { remaining } =
            self.cooldowns.check_and_record(&key, request.received_at)
        {
            debug!(seq, key = %label, condition = %request.condition, "escalation suppressed by cooldown");
            self.audit.log(
                &label,
                Some(seq),
                LogLevel::Debug,
                EscalationPhase::Cooldown,
                format!("suppressed, {:.1}s left in window", remaining.as_secs_f64()),
            );
            self.with_metrics(|m| m.suppressed += 1);
            return Admission::Suppressed;
        }

        self.with_metrics(|m| m.escalated += 1);

        if self.contacts.is_empty() {
            warn!(seq, key = %label, "escalation recorded but the contact list is empty");
            self.audit.log(
                &label,
                Some(seq),
                LogLevel::Warning,
                EscalationPhase::Enqueue,
                "no contacts to call",
            );
            self.with_metrics(|m| m.skipped_no_contacts += 1);
            return Admission::NoContacts;
        }

        info!(
            seq,
            key = %label,
            condition = %request.condition,
            recipients = self.contacts.len(),
            "escalating"
        );
        self.audit.log_with_details(
            &label,
            Some(seq),
            LogLevel::Info,
            EscalationPhase::Enqueue,
            format!("call run queued for {} recipients", self.contacts.len()),
            serde_json::to_value(&request.condition).ok(),
        );

        let run = CallRun::new(request, self.contacts.snapshot());
        let dropped = self.queue.push(run);
        let pending = self.queue.len();

        match dropped {
            None => {
                self.with_metrics(|m| m.pending_runs = pending);
                Admission::Enqueued { seq }
            }
            Some(dropped) => {
                let err = VigilError::QueueOverflow {
                    dropped_seq: dropped.seq,
                };
                warn!(error = %err, dropped_key = %dropped.key, capacity = self.queue.capacity(), "call-run queue overflow");
                self.audit.log(
                    &dropped.key.to_string(),
                    Some(dropped.seq),
                    LogLevel::Warning,
                    EscalationPhase::Overflow,
                    err.to_string(),
                );
                self.with_metrics(|m| {
                    m.overflowed += 1;
                    m.pending_runs = pending;
                });
                Admission::Overflowed {
                    seq,
                    dropped_seq: dropped.seq,
                }
            }
        }
    }

    /// Admit requests until the ingress closes or shutdown is signalled, then
    /// close the run queue.
    pub async fn run(
        mut self,
        mut ingress: mpsc::UnboundedReceiver<EscalationRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => {
                    let dropped = drain_pending(&mut ingress);
                    if dropped > 0 {
                        warn!(dropped, "shutdown with unprocessed escalation requests");
                    }
                    break;
                }
                request = ingress.recv() => match request {
                    Some(request) => {
                        self.admit(request);
                    }
                    None => break,
                },
            }
        }
        debug!("cooldown gate stopped");
        self.queue.close();
    }

    fn with_metrics(&self, update: impl FnOnce(&mut EscalationMetrics)) {
        update(&mut self.metrics.write().expect("metrics lock poisoned"));
    }
}

fn drain_pending(ingress: &mut mpsc::UnboundedReceiver<EscalationRequest>) -> usize {
    ingress.close();
    let mut dropped = 0;
    while ingress.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
