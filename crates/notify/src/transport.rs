//! Call transport trait and shared error types.

use std::fmt;

use async_trait::async_trait;
use vigil_core::PhoneNumber;

/// Errors surfaced by a single transport command.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no response to {command} within {after_ms}ms")]
    Timeout { command: String, after_ms: u64 },

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("transport closed")]
    Closed,

    #[error("transport IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// The two commands the escalation engine issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Dial(PhoneNumber),
    Hangup,
}

impl fmt::Display for TransportCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportCommand::Dial(number) => write!(f, "dial {number}"),
            TransportCommand::Hangup => f.write_str("hangup"),
        }
    }
}

/// A single call line.
///
/// `send` resolves once the line accepted (`Ok`) or refused (`Err`) the
/// command. Implementations need not bound their own wait; the dialer wraps
/// every call in the configured command timeout. Only one command is ever in
/// flight.
#[async_trait]
pub trait CallTransport: Send {
    async fn send(&mut self, command: &TransportCommand) -> Result<(), TransportError>;

    /// Human-readable name for logs (e.g., the device path).
    fn name(&self) -> &str;
}
