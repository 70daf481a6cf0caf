use async_trait::async_trait;
use thiserror::Error;

use vigil_core::{AlertCondition, FallEvent, VigilError, VitalSnapshot};
use vigil_escalation::EscalationCoordinator;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("data store error: {0}")]
    Api(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream of confidence-scored fall detections.
#[async_trait]
pub trait FallDetector: Send {
    /// Next detection, or `None` once the stream has ended.
    async fn next_event(&mut self) -> Result<Option<FallEvent>, SourceError>;

    fn name(&self) -> &str;
}

/// Periodically polled vital-sign snapshots, zero or more subjects per poll.
#[async_trait]
pub trait VitalSource: Send + Sync {
    async fn poll(&self) -> Result<Vec<VitalSnapshot>, SourceError>;

    fn name(&self) -> &str;
}

/// Where danger conditions go. Must not block.
pub trait ConditionSink: Send + Sync {
    fn submit(&self, condition: AlertCondition) -> Result<u64, VigilError>;
}

impl ConditionSink for EscalationCoordinator {
    fn submit(&self, condition: AlertCondition) -> Result<u64, VigilError> {
        EscalationCoordinator::submit(self, condition)
    }
}
