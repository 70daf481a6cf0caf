//! Danger-condition rules for the escalation engine.
//!
//! This crate provides:
//! - `ConditionEvaluator`: pure threshold checks over fall events and vital snapshots
//! - `CooldownTable`: per-key rate limiting of escalations
//! - `AuditLog`: in-memory per-key record of escalation decisions

pub mod audit_log;
pub mod cooldown;
pub mod evaluator;

pub use audit_log::{AuditLog, EscalationPhase, LogEntry, LogLevel, LogQueryParams};
pub use cooldown::{CooldownDecision, CooldownTable};
pub use evaluator::{ConditionEvaluator, VitalEvaluation};
