//! Ingestion loop: fall feed plus periodic vital polling, evaluated and
//! handed to the escalation engine.
//!
//! The fall feed is read on its own task and forwarded over a channel, so a
//! slow vital poll only delays event handling, never loses events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use vigil_core::config::VitalsConfig;
use vigil_core::{AlertCondition, FallEvent, VitalSnapshot};
use vigil_rules::ConditionEvaluator;

use crate::traits::{ConditionSink, FallDetector, VitalSource};

/// Fall events buffered between the feed task and the monitor.
const FEED_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Shutdown,
    /// The fall feed ended and the monitor was told to stop with it.
    FeedEnded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub fall_events: u64,
    pub falls_detected: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub confirmation_polls: u64,
    pub snapshots: u64,
    pub conditions_submitted: u64,
    pub submit_errors: u64,
}

#[derive(Debug, Clone, Copy)]
enum PollReason {
    Scheduled,
    FallConfirmation,
}

impl PollReason {
    fn as_str(&self) -> &'static str {
        match self {
            PollReason::Scheduled => "scheduled",
            PollReason::FallConfirmation => "fall confirmation",
        }
    }
}

pub struct Monitor {
    evaluator: ConditionEvaluator,
    sink: Arc<dyn ConditionSink>,
    vitals: Option<Arc<dyn VitalSource>>,
    poll_interval: Duration,
    confirm_min_interval: Duration,
    exit_on_feed_end: bool,
    last_confirmation: Option<Instant>,
    stats: MonitorStats,
}

impl Monitor {
    pub fn new(evaluator: ConditionEvaluator, sink: Arc<dyn ConditionSink>) -> Self {
        Self {
            evaluator,
            sink,
            vitals: None,
            poll_interval: Duration::from_secs(5),
            confirm_min_interval: Duration::from_secs(1),
            exit_on_feed_end: false,
            last_confirmation: None,
            stats: MonitorStats::default(),
        }
    }

    /// Enable vital polling with the intervals from `config`.
    pub fn with_vitals(mut self, source: Arc<dyn VitalSource>, config: &VitalsConfig) -> Self {
        self.vitals = Some(source);
        self.poll_interval = config.poll_interval;
        self.confirm_min_interval = config.confirm_min_interval;
        self
    }

    pub fn exit_on_feed_end(mut self, exit: bool) -> Self {
        self.exit_on_feed_end = exit;
        self
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Run until shutdown, or until the feed ends when `exit_on_feed_end` is set.
    pub async fn run(
        &mut self,
        detector: Box<dyn FallDetector>,
        mut shutdown: watch::Receiver<bool>,
    ) -> MonitorExit {
        let (mut events, feed_task) = spawn_feed(detector);
        let mut ticker = self.vitals.as_ref().map(|_| {
            let mut ticker = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut feed_open = true;

        info!(
            vitals = self.vitals.as_ref().map(|v| v.name()).unwrap_or("(disabled)"),
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "monitor started"
        );

        let exit = loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => break MonitorExit::Shutdown,
                event = events.recv(), if feed_open => match event {
                    Some(event) => self.on_fall_event(event).await,
                    None => {
                        feed_open = false;
                        info!(events = self.stats.fall_events, "fall feed ended");
                        if self.exit_on_feed_end {
                            break MonitorExit::FeedEnded;
                        }
                    }
                },
                _ = tick(&mut ticker) => self.poll_vitals(PollReason::Scheduled).await,
            }
        };

        feed_task.abort();
        info!(?exit, stats = ?self.stats, "monitor stopped");
        exit
    }

    async fn on_fall_event(&mut self, event: FallEvent) {
        self.stats.fall_events += 1;
        let Some(condition) = self.evaluator.evaluate_fall(&event) else {
            debug!(confidence = event.confidence, "detection below fall threshold");
            return;
        };

        self.stats.falls_detected += 1;
        info!(confidence = event.confidence, "fall detected");
        self.submit(condition);

        if self.vitals.is_some() && self.confirmation_due() {
            self.last_confirmation = Some(Instant::now());
            self.stats.confirmation_polls += 1;
            self.poll_vitals(PollReason::FallConfirmation).await;
        }
    }

    fn confirmation_due(&self) -> bool {
        self.last_confirmation
            .map_or(true, |last| last.elapsed() >= self.confirm_min_interval)
    }

    async fn poll_vitals(&mut self, reason: PollReason) {
        let Some(source) = self.vitals.clone() else {
            return;
        };
        match source.poll().await {
            Ok(snapshots) => {
                self.stats.polls_ok += 1;
                for snapshot in &snapshots {
                    self.on_snapshot(snapshot);
                }
            }
            Err(e) => {
                self.stats.polls_failed += 1;
                warn!(source = %source.name(), reason = reason.as_str(), error = %e, "vital poll failed, retrying next tick");
            }
        }
    }

    fn on_snapshot(&mut self, snapshot: &VitalSnapshot) {
        self.stats.snapshots += 1;
        info!(
            subject = %snapshot.subject_id,
            temperature = ?snapshot.temperature,
            fallen = snapshot.fallen,
            oxygen = ?snapshot.oxygen,
            heart_rate = ?snapshot.heart_rate,
            "vital snapshot"
        );

        let evaluation = self.evaluator.evaluate_vitals(snapshot);
        if evaluation.is_normal() {
            info!(subject = %snapshot.subject_id, "health parameters within normal ranges");
            return;
        }
        for shadowed in &evaluation.shadowed {
            warn!(subject = %snapshot.subject_id, condition = %shadowed, "out of range while fall flag set");
        }
        for condition in evaluation.conditions {
            warn!(subject = %snapshot.subject_id, condition = %condition, "danger condition");
            self.submit(condition);
        }
    }

    fn submit(&mut self, condition: AlertCondition) {
        match self.sink.submit(condition) {
            Ok(seq) => {
                self.stats.conditions_submitted += 1;
                debug!(seq, "condition submitted");
            }
            Err(e) => {
                self.stats.submit_errors += 1;
                warn!(error = %e, "condition not submitted");
            }
        }
    }
}

/// Read the detector on its own task. The channel closes when the feed ends.
fn spawn_feed(
    mut detector: Box<dyn FallDetector>,
) -> (mpsc::Receiver<FallEvent>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    let handle = tokio::spawn(async move {
        loop {
            match detector.next_event().await {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(feed = %detector.name(), error = %e, "fall feed read failed, closing feed");
                    break;
                }
            }
        }
    });
    (rx, handle)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
