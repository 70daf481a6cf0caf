//! Per-recipient call dispatch.
//!
//! Each recipient walks `Idle → Dialing → Holding → HangingUp → Completed`
//! and drops to `Failed` on the first transport error or command timeout.
//! A failed recipient never stops the rest of the run, and nothing is
//! retried within a run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vigil_core::config::EscalationConfig;
use vigil_core::PhoneNumber;

use crate::transport::{CallTransport, TransportCommand, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Dialing,
    Holding,
    HangingUp,
    Completed,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Completed | CallState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CallOutcome {
    Completed,
    TransportError(String),
    TimedOut(String),
    /// The number failed validation; the transport was never touched.
    MalformedContact(String),
    /// Shutdown cut the hold or settle short.
    Interrupted,
}

impl CallOutcome {
    fn from_error(err: &TransportError) -> Self {
        if err.is_timeout() {
            CallOutcome::TimedOut(err.to_string())
        } else {
            CallOutcome::TransportError(err.to_string())
        }
    }
}

/// One recipient's pass through the state machine.
#[derive(Debug, Clone, Serialize)]
pub struct CallAttempt {
    pub recipient: String,
    pub state: CallState,
    /// Every state visited, starting with `Idle`.
    pub transitions: Vec<CallState>,
    pub started_at: DateTime<Utc>,
    pub outcome: Option<CallOutcome>,
}

impl CallAttempt {
    fn new(recipient: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            state: CallState::Idle,
            transitions: vec![CallState::Idle],
            started_at: Utc::now(),
            outcome: None,
        }
    }

    fn transition(&mut self, to: CallState) {
        debug!(recipient = %self.recipient, from = ?self.state, to = ?to, "call state transition");
        self.state = to;
        self.transitions.push(to);
    }

    fn fail(mut self, outcome: CallOutcome) -> Self {
        self.transition(CallState::Failed);
        self.outcome = Some(outcome);
        self
    }

    fn complete(mut self) -> Self {
        self.transition(CallState::Completed);
        self.outcome = Some(CallOutcome::Completed);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.state == CallState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == CallState::Failed
    }
}

/// Fixed delays and the per-command response bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialTimings {
    pub hold: Duration,
    pub settle: Duration,
    pub command_timeout: Duration,
}

impl Default for DialTimings {
    fn default() -> Self {
        Self::from(&EscalationConfig::default())
    }
}

impl From<&EscalationConfig> for DialTimings {
    fn from(config: &EscalationConfig) -> Self {
        Self {
            hold: config.hold,
            settle: config.settle,
            command_timeout: config.command_timeout,
        }
    }
}

/// Drives call attempts over the one transport it owns.
pub struct CallDialer {
    transport: Box<dyn CallTransport>,
    timings: DialTimings,
    shutdown: watch::Receiver<bool>,
}

impl CallDialer {
    /// `shutdown` flipping to `true` cuts holds and settles short; a command
    /// already in flight always runs to its ack or timeout.
    pub fn new(
        transport: Box<dyn CallTransport>,
        timings: DialTimings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            timings,
            shutdown,
        }
    }

    /// A dialer that is never interrupted.
    pub fn without_shutdown(transport: Box<dyn CallTransport>, timings: DialTimings) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(transport, timings, rx)
    }

    pub fn timings(&self) -> &DialTimings {
        &self.timings
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Call every recipient in order. `on_attempt` sees each finished attempt
    /// before the next recipient is dialed. Stops early only on shutdown.
    pub async fn call_all<F>(&mut self, recipients: &[String], mut on_attempt: F) -> Vec<CallAttempt>
    where
        F: FnMut(&CallAttempt),
    {
        let mut attempts = Vec::with_capacity(recipients.len());

        for (i, recipient) in recipients.iter().enumerate() {
            if self.shutdown_requested() {
                warn!(
                    skipped = recipients.len() - i,
                    "shutdown requested, remaining recipients not called"
                );
                break;
            }
            let attempt = self.call(recipient).await;
            on_attempt(&attempt);
            attempts.push(attempt);
        }

        attempts
    }

    /// Run one recipient through the state machine.
    pub async fn call(&mut self, recipient: &str) -> CallAttempt {
        let attempt = CallAttempt::new(recipient);

        let number = match PhoneNumber::parse(recipient) {
            Ok(number) => number,
            Err(e) => {
                warn!(recipient, reason = %e, "call attempt failed: malformed contact");
                return attempt.fail(CallOutcome::MalformedContact(e.to_string()));
            }
        };

        let mut attempt = attempt;
        attempt.transition(CallState::Dialing);
        if let Err(e) = self.command(TransportCommand::Dial(number)).await {
            log_failure(recipient, CallState::Dialing, &e);
            if e.is_timeout() {
                // The modem may still be dialing; put the line back on-hook
                // before the next recipient.
                if let Err(hangup_err) = self.command(TransportCommand::Hangup).await {
                    debug!(recipient, error = %hangup_err, "hangup after dial timeout failed");
                }
            }
            return attempt.fail(CallOutcome::from_error(&e));
        }

        attempt.transition(CallState::Holding);
        let held = self.pause(self.timings.hold).await;

        attempt.transition(CallState::HangingUp);
        if let Err(e) = self.command(TransportCommand::Hangup).await {
            log_failure(recipient, CallState::HangingUp, &e);
            return attempt.fail(CallOutcome::from_error(&e));
        }

        if !held || !self.pause(self.timings.settle).await {
            warn!(recipient, "call attempt interrupted by shutdown, line hung up");
            return attempt.fail(CallOutcome::Interrupted);
        }

        info!(recipient, "call attempt completed");
        attempt.complete()
    }

    async fn command(&mut self, command: TransportCommand) -> Result<(), TransportError> {
        let limit = self.timings.command_timeout;
        match tokio::time::timeout(limit, self.transport.send(&command)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                command: command.to_string(),
                after_ms: limit.as_millis() as u64,
            }),
        }
    }

    /// Sleep for `duration`; `false` when shutdown cut it short.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = shutdown_signalled(&mut self.shutdown) => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn log_failure(recipient: &str, state: CallState, err: &TransportError) {
    if err.is_timeout() {
        warn!(recipient, state = ?state, error = %err, "call attempt failed: no response from transport");
    } else {
        warn!(recipient, state = ?state, error = %err, "call attempt failed: transport error");
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // Sender dropped without a shutdown; nothing can interrupt any more.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockTransport};
    use tokio::time::Instant;

    fn timings() -> DialTimings {
        DialTimings {
            hold: Duration::from_secs(10),
            settle: Duration::from_secs(5),
            command_timeout: Duration::from_secs(3),
        }
    }

    fn recipients(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn acked_call_walks_every_state() {
        let transport = MockTransport::acking();
        let log = transport.log();
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        let start = Instant::now();
        let attempt = dialer.call("111").await;

        assert!(attempt.is_completed());
        assert_eq!(attempt.outcome, Some(CallOutcome::Completed));
        assert_eq!(
            attempt.transitions,
            vec![
                CallState::Idle,
                CallState::Dialing,
                CallState::Holding,
                CallState::HangingUp,
                CallState::Completed,
            ]
        );
        assert!(start.elapsed() >= Duration::from_secs(15));

        let commands = log.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].command, TransportCommand::Hangup);
        assert_eq!(commands[1].at - commands[0].at, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_contact_never_touches_transport() {
        let transport = MockTransport::acking();
        let log = transport.log();
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        for entry in ["", "call-me", "12 34"] {
            let attempt = dialer.call(entry).await;
            assert!(attempt.is_failed());
            assert_eq!(attempt.transitions, vec![CallState::Idle, CallState::Failed]);
            assert!(matches!(attempt.outcome, Some(CallOutcome::MalformedContact(_))));
        }
        assert!(log.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_dial_times_out_and_hangs_up() {
        let transport = MockTransport::never_responding();
        let log = transport.log();
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        let start = Instant::now();
        let attempt = dialer.call("111").await;

        assert!(attempt.is_failed());
        assert_eq!(attempt.transitions, vec![CallState::Idle, CallState::Dialing, CallState::Failed]);
        assert!(matches!(attempt.outcome, Some(CallOutcome::TimedOut(ref c)) if c.contains("dial")));
        // Dial timeout plus the best-effort hangup's own timeout.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(
            log.commands().iter().map(|c| c.command.clone()).collect::<Vec<_>>(),
            vec![
                TransportCommand::Dial(PhoneNumber::parse("111").unwrap()),
                TransportCommand::Hangup,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dial_timeout_hangs_up_before_next_recipient() {
        let transport = MockTransport::acking().with_dial("111", MockBehavior::NeverRespond);
        let log = transport.log();
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        let attempts = dialer.call_all(&recipients(&["111", "222"]), |_| {}).await;

        assert!(matches!(attempts[0].outcome, Some(CallOutcome::TimedOut(_))));
        assert!(attempts[1].is_completed());
        let commands: Vec<TransportCommand> = log.commands().into_iter().map(|c| c.command).collect();
        assert_eq!(
            commands,
            vec![
                TransportCommand::Dial(PhoneNumber::parse("111").unwrap()),
                TransportCommand::Hangup,
                TransportCommand::Dial(PhoneNumber::parse("222").unwrap()),
                TransportCommand::Hangup,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_dial_sends_no_hangup() {
        let transport = MockTransport::acking().with_dial("111", MockBehavior::Reject("BUSY".to_string()));
        let log = transport.log();
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        let attempt = dialer.call("111").await;

        assert!(attempt.is_failed());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_hangup_fails_the_attempt() {
        let transport =
            MockTransport::acking().with_hangup(MockBehavior::Reject("ERROR".to_string()));
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        let attempt = dialer.call("111").await;

        assert_eq!(attempt.transitions.last(), Some(&CallState::Failed));
        assert!(attempt.transitions.contains(&CallState::HangingUp));
        assert!(matches!(attempt.outcome, Some(CallOutcome::TransportError(ref r)) if r.contains("ERROR")));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_run() {
        let transport = MockTransport::acking()
            .with_dial("111", MockBehavior::Reject("BUSY".to_string()));
        let log = transport.log();
        let mut dialer = CallDialer::without_shutdown(Box::new(transport), timings());

        let mut seen = Vec::new();
        let attempts = dialer
            .call_all(&recipients(&["111", "bad!", "222"]), |a| seen.push(a.recipient.clone()))
            .await;

        assert_eq!(seen, vec!["111", "bad!", "222"]);
        assert!(attempts[0].is_failed());
        assert!(attempts[1].is_failed());
        assert!(attempts[2].is_completed());
        assert_eq!(log.dialed(), vec!["111", "222"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_hold_hangs_up_and_stops() {
        let transport = MockTransport::acking();
        let log = transport.log();
        let (tx, rx) = watch::channel(false);
        let mut dialer = CallDialer::new(Box::new(transport), timings(), rx);

        let start = Instant::now();
        let run = tokio::spawn(async move {
            dialer
                .call_all(&recipients(&["111", "222"]), |_| {})
                .await
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(true).unwrap();
        let attempts = run.await.unwrap();

        assert_eq!(attempts.len(), 1, "second recipient must not be dialed");
        assert_eq!(attempts[0].outcome, Some(CallOutcome::Interrupted));
        assert_eq!(
            log.commands().iter().map(|c| c.command.clone()).collect::<Vec<_>>(),
            vec![
                TransportCommand::Dial(PhoneNumber::parse("111").unwrap()),
                TransportCommand::Hangup,
            ]
        );
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
