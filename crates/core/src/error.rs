use std::fmt;

use thiserror::Error;

/// External collaborator whose startup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    VisionFeed,
    DataStore,
    Transport,
    Contacts,
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Adapter::VisionFeed => "vision feed",
            Adapter::DataStore => "vital data store",
            Adapter::Transport => "call transport",
            Adapter::Contacts => "contact list",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum VigilError {
    /// Fatal: raised only while wiring adapters at startup.
    #[error("{adapter} initialization failed: {reason}")]
    AdapterInit { adapter: Adapter, reason: String },

    #[error("malformed contact '{entry}': {reason}")]
    MalformedContact { entry: String, reason: String },

    #[error("call-run queue full, dropped pending run #{dropped_seq}")]
    QueueOverflow { dropped_seq: u64 },

    #[error("escalation engine has stopped")]
    EngineStopped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VigilError {
    pub fn adapter_init(adapter: Adapter, reason: impl fmt::Display) -> Self {
        VigilError::AdapterInit {
            adapter,
            reason: reason.to_string(),
        }
    }

    /// Whether the error should terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VigilError::AdapterInit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_init_is_the_only_fatal_error() {
        let fatal = VigilError::adapter_init(Adapter::Transport, "no such device");
        assert!(fatal.is_fatal());
        assert_eq!(
            fatal.to_string(),
            "call transport initialization failed: no such device"
        );

        assert!(!VigilError::QueueOverflow { dropped_seq: 4 }.is_fatal());
        assert!(!VigilError::MalformedContact {
            entry: "abc".into(),
            reason: "non-digit".into()
        }
        .is_fatal());
    }
}
