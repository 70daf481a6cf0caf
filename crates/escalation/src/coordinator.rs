//! Escalation coordinator handle.
//!
//! `submit` stamps a request and hands it to the gate task over an unbounded
//! channel, so producers never wait on cooldown bookkeeping or dialing. The
//! gate owns the cooldown table; the dial worker owns the transport. Both run
//! as tokio tasks until [`EscalationCoordinator::shutdown`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use vigil_core::config::EscalationConfig;
use vigil_core::{AlertCondition, ContactList, VigilError};
use vigil_notify::{CallDialer, CallTransport, DialTimings};
use vigil_rules::{AuditLog, CooldownTable};

use crate::gate::Gate;
use crate::metrics::EscalationMetrics;
use crate::queue::RunQueue;
use crate::request::{EscalationRequest, RunReport};
use crate::worker::DialWorker;

/// Buffered reports per subscriber before the slowest one lags.
const REPORT_CAPACITY: usize = 64;

pub struct EscalationCoordinator {
    /// `None` once ingress is closed.
    ingress: Mutex<Option<mpsc::UnboundedSender<EscalationRequest>>>,
    next_seq: AtomicU64,
    metrics: Arc<RwLock<EscalationMetrics>>,
    audit: AuditLog,
    reports: broadcast::Sender<RunReport>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EscalationCoordinator {
    /// Spawn the gate and dial worker. Must be called inside a tokio runtime.
    pub fn start(
        config: &EscalationConfig,
        contacts: ContactList,
        transport: Box<dyn CallTransport>,
    ) -> Self {
        Self::start_with_audit(config, contacts, transport, AuditLog::new())
    }

    pub fn start_with_audit(
        config: &EscalationConfig,
        contacts: ContactList,
        transport: Box<dyn CallTransport>,
        audit: AuditLog,
    ) -> Self {
        let (ingress, requests) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let metrics = Arc::new(RwLock::new(EscalationMetrics::default()));
        let queue = Arc::new(RunQueue::new(config.max_pending_runs));

        info!(
            transport = %transport.name(),
            contacts = contacts.len(),
            cooldown_secs = config.cooldown.as_secs_f64(),
            max_pending_runs = queue.capacity(),
            "starting escalation coordinator"
        );

        let gate = Gate::new(
            CooldownTable::new(config.cooldown),
            contacts,
            queue.clone(),
            metrics.clone(),
            audit.clone(),
        );
        let dialer = CallDialer::new(transport, DialTimings::from(config), shutdown_rx.clone());
        let worker = DialWorker::new(dialer, queue, metrics.clone(), audit.clone(), reports.clone());

        let tasks = vec![
            tokio::spawn(gate.run(requests, shutdown_rx)),
            tokio::spawn(worker.run()),
        ];

        Self {
            ingress: Mutex::new(Some(ingress)),
            next_seq: AtomicU64::new(1),
            metrics,
            audit,
            reports,
            shutdown,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queue a danger condition for the cooldown gate. Never blocks; returns
    /// the request's sequence number.
    pub fn submit(&self, condition: AlertCondition) -> Result<u64, VigilError> {
        if *self.shutdown.borrow() {
            return Err(VigilError::EngineStopped);
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let request = EscalationRequest {
            seq,
            condition,
            received_at: Instant::now(),
        };
        self.ingress
            .lock()
            .expect("ingress lock poisoned")
            .as_ref()
            .ok_or(VigilError::EngineStopped)?
            .send(request)
            .map_err(|_| VigilError::EngineStopped)?;
        self.metrics.write().expect("metrics lock poisoned").submitted += 1;
        Ok(seq)
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> EscalationMetrics {
        self.metrics.read().expect("metrics lock poisoned").clone()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Reports of runs finished after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RunReport> {
        self.reports.subscribe()
    }

    /// Shutdown was requested or ingress is closed.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow() || self.ingress.lock().expect("ingress lock poisoned").is_none()
    }

    /// Flag shutdown without waiting. The dial worker stops after the
    /// in-flight recipient's current command; holds and settles are cut short.
    pub fn request_shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("escalation coordinator shutting down");
        }
    }

    /// Stop ingress, let the in-flight recipient finish its current command,
    /// and wait for both tasks. Pending runs are dropped. Idempotent.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        self.close_ingress();
        self.join().await;
    }

    /// Stop ingress but let every queued run finish before returning.
    /// A concurrent [`request_shutdown`](Self::request_shutdown) cuts the
    /// drain short.
    pub async fn drain(&self) {
        info!(pending_runs = self.metrics().pending_runs, "draining escalation coordinator");
        self.close_ingress();
        self.join().await;
    }

    fn close_ingress(&self) {
        self.ingress.lock().expect("ingress lock poisoned").take();
    }

    async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().expect("task list lock poisoned");
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "escalation task ended abnormally");
            }
        }
    }
}

impl Drop for EscalationCoordinator {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
