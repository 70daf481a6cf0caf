//! In-memory structured audit log for escalation decisions.
//!
//! Stores per-cooldown-key entries capped at a configurable maximum (default
//! 200) with FIFO eviction. Uses `std::sync::RwLock` so the coordinator's
//! tasks and synchronous callers can share it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity level for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Numeric severity for comparison (higher = more severe).
    pub fn as_severity(&self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
        }
    }
}

/// Step of the escalation pipeline that produced the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPhase {
    Cooldown,
    Enqueue,
    Overflow,
    Dial,
    Hold,
    Hangup,
    Complete,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub key: String,
    /// Escalation request / call-run sequence number, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub level: LogLevel,
    pub phase: EscalationPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Query parameters for filtering audit log entries.
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Minimum log level (inclusive).
    pub level: Option<LogLevel>,
    pub phase: Option<EscalationPhase>,
    /// Maximum number of entries to return (default 100).
    pub limit: Option<u32>,
    /// Only return entries at or after this ISO 8601 timestamp.
    pub since: Option<String>,
}

/// Per-key audit log with FIFO eviction. Cloning shares the same storage.
#[derive(Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<HashMap<String, VecDeque<LogEntry>>>>,
    max_entries_per_key: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_max_entries(200)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_key: max,
        }
    }

    pub fn log(
        &self,
        key: &str,
        seq: Option<u64>,
        level: LogLevel,
        phase: EscalationPhase,
        message: impl Into<String>,
    ) {
        self.log_with_details(key, seq, level, phase, message, None);
    }

    pub fn log_with_details(
        &self,
        key: &str,
        seq: Option<u64>,
        level: LogLevel,
        phase: EscalationPhase,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            key: key.to_string(),
            seq,
            level,
            phase,
            message: message.into(),
            details,
        };

        let mut guard = self.entries.write().expect("audit_log lock poisoned");
        let deque = guard.entry(key.to_string()).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_key {
            deque.pop_front();
        }
    }

    /// Entries for `key`, newest first, filtered by `params`.
    pub fn query(&self, key: &str, params: &LogQueryParams) -> Vec<LogEntry> {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        let Some(deque) = guard.get(key) else {
            return Vec::new();
        };

        let min_severity = params.level.as_ref().map(|l| l.as_severity()).unwrap_or(0);
        let since: Option<DateTime<Utc>> = params
            .since
            .as_ref()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());
        let limit = params.limit.unwrap_or(100) as usize;

        deque
            .iter()
            .rev()
            .filter(|e| e.level.as_severity() >= min_severity)
            .filter(|e| params.phase.as_ref().map_or(true, |p| &e.phase == p))
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Keys that have at least one entry, sorted.
    pub fn keys(&self) -> Vec<String> {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self, key: &str) {
        let mut guard = self.entries.write().expect("audit_log lock poisoned");
        guard.remove(key);
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_returns_newest_first() {
        let log = AuditLog::new();
        log.log("vision", Some(1), LogLevel::Info, EscalationPhase::Enqueue, "queued");
        log.log("vision", Some(1), LogLevel::Info, EscalationPhase::Dial, "dialing 111");
        log.log("vision", Some(1), LogLevel::Info, EscalationPhase::Complete, "done");

        let entries = log.query("vision", &LogQueryParams::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].phase, EscalationPhase::Complete);
        assert_eq!(entries[2].phase, EscalationPhase::Enqueue);
    }

    #[test]
    fn level_and_phase_filters() {
        let log = AuditLog::new();
        log.log("k", None, LogLevel::Debug, EscalationPhase::Cooldown, "suppressed");
        log.log("k", Some(2), LogLevel::Warning, EscalationPhase::Failure, "111 failed");
        log.log("k", Some(2), LogLevel::Error, EscalationPhase::Failure, "all failed");

        let warnings = log.query(
            "k",
            &LogQueryParams {
                level: Some(LogLevel::Warning),
                ..Default::default()
            },
        );
        assert_eq!(warnings.len(), 2);

        let cooldowns = log.query(
            "k",
            &LogQueryParams {
                phase: Some(EscalationPhase::Cooldown),
                ..Default::default()
            },
        );
        assert_eq!(cooldowns.len(), 1);
        assert_eq!(cooldowns[0].seq, None);
    }

    #[test]
    fn fifo_eviction_per_key() {
        let log = AuditLog::with_max_entries(2);
        for i in 1..=3 {
            log.log("k", Some(i), LogLevel::Info, EscalationPhase::Enqueue, format!("run {i}"));
        }
        log.log("other", None, LogLevel::Info, EscalationPhase::Enqueue, "run");

        let entries = log.query("k", &LogQueryParams::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "run 2");
        assert_eq!(log.query("other", &LogQueryParams::default()).len(), 1);
    }

    #[test]
    fn clones_share_storage() {
        let log = AuditLog::new();
        let handle = log.clone();
        handle.log("vision", None, LogLevel::Info, EscalationPhase::Enqueue, "queued");
        assert_eq!(log.keys(), vec!["vision".to_string()]);

        log.clear("vision");
        assert!(handle.query("vision", &LogQueryParams::default()).is_empty());
    }
}
