//! Recipient numbers for call runs.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Adapter, VigilError};

/// A validated dialable number: digits and `+` only, at least one digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(entry: &str) -> Result<Self, VigilError> {
        let malformed = |reason: &str| VigilError::MalformedContact {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        if entry.is_empty() {
            return Err(malformed("empty entry"));
        }
        if let Some(bad) = entry.chars().find(|c| !(c.is_ascii_digit() || *c == '+')) {
            return Err(malformed(&format!("invalid character {bad:?}")));
        }
        if !entry.chars().any(|c| c.is_ascii_digit()) {
            return Err(malformed("no digits"));
        }
        Ok(Self(entry.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, immutable recipient list.
///
/// Entries are kept verbatim; validation happens per call attempt so one bad
/// line costs one recipient rather than the whole list.
#[derive(Debug, Clone)]
pub struct ContactList {
    entries: Arc<[String]>,
}

impl ContactList {
    pub fn new(entries: Vec<String>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// One entry per line; surrounding whitespace trimmed, blank lines skipped.
    pub fn parse_str(contents: &str) -> Self {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// Load the contact file. A missing or unreadable file is fatal at startup;
    /// an empty file is a valid (empty) list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VigilError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VigilError::adapter_init(Adapter::Contacts, format!("{}: {e}", path.display()))
        })?;
        let list = Self::parse_str(&contents);
        tracing::info!(path = %path.display(), contacts = list.len(), "contact list loaded");
        Ok(list)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Cheap shared snapshot for a call run.
    pub fn snapshot(&self) -> Arc<[String]> {
        Arc::clone(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContactList {
    fn default() -> Self {
        Self::empty()
    }
}
