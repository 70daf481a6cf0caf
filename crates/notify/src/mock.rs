//! Scriptable in-memory transport for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::transport::{CallTransport, TransportCommand, TransportError};

/// How the mock answers a command.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Ack,
    /// Never answers; only the dialer's command timeout ends the wait.
    NeverRespond,
    Reject(String),
    Close,
}

#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub command: TransportCommand,
    pub at: Instant,
}

/// Shared view of every command a [`MockTransport`] received.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<RecordedCommand>>>);

impl CommandLog {
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.0.lock().expect("command log lock poisoned").clone()
    }

    pub fn dialed(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c.command {
                TransportCommand::Dial(number) => Some(number.as_str().to_string()),
                TransportCommand::Hangup => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().expect("command log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, command: &TransportCommand) {
        self.0
            .lock()
            .expect("command log lock poisoned")
            .push(RecordedCommand {
                command: command.clone(),
                at: Instant::now(),
            });
    }
}

pub struct MockTransport {
    default: MockBehavior,
    dial_overrides: HashMap<String, MockBehavior>,
    hangup: Option<MockBehavior>,
    log: CommandLog,
}

impl MockTransport {
    pub fn new(default: MockBehavior) -> Self {
        Self {
            default,
            dial_overrides: HashMap::new(),
            hangup: None,
            log: CommandLog::default(),
        }
    }

    pub fn acking() -> Self {
        Self::new(MockBehavior::Ack)
    }

    pub fn never_responding() -> Self {
        Self::new(MockBehavior::NeverRespond)
    }

    /// Answer dials to `number` with `behavior` instead of the default.
    pub fn with_dial(mut self, number: &str, behavior: MockBehavior) -> Self {
        self.dial_overrides.insert(number.to_string(), behavior);
        self
    }

    pub fn with_hangup(mut self, behavior: MockBehavior) -> Self {
        self.hangup = Some(behavior);
        self
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn behavior_for(&self, command: &TransportCommand) -> MockBehavior {
        match command {
            TransportCommand::Dial(number) => self
                .dial_overrides
                .get(number.as_str())
                .unwrap_or(&self.default)
                .clone(),
            TransportCommand::Hangup => self.hangup.as_ref().unwrap_or(&self.default).clone(),
        }
    }
}

#[async_trait]
impl CallTransport for MockTransport {
    async fn send(&mut self, command: &TransportCommand) -> Result<(), TransportError> {
        self.log.push(command);
        match self.behavior_for(command) {
            MockBehavior::Ack => Ok(()),
            MockBehavior::NeverRespond => std::future::pending().await,
            MockBehavior::Reject(reason) => Err(TransportError::Rejected(reason)),
            MockBehavior::Close => Err(TransportError::Closed),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
