//! Escalation coordinator: cooldown gate, bounded call-run queue and the
//! single dial worker that owns the call transport.

pub mod coordinator;
pub mod gate;
pub mod metrics;
pub mod queue;
pub mod request;
pub mod worker;

pub use coordinator::EscalationCoordinator;
pub use metrics::EscalationMetrics;
pub use queue::RunQueue;
pub use request::{CallRun, EscalationRequest, RunReport};
