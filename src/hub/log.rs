//! Severity-tagged message log backing the UI log view

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Severity marker shown next to a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Routine output
    Normal,
    /// Something worth a second look
    Warning,
    /// A failure
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was added
    pub timestamp: DateTime<Utc>,
    /// Severity marker
    pub severity: Severity,
    /// Actor the message concerns, if any
    pub actor: Option<String>,
    /// Message text
    pub text: String,
}

/// Bounded in-memory message log; the oldest entries are discarded first.
pub struct MessageLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl MessageLog {
    /// Create a log holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry and mirror it to tracing
    pub fn add(&self, severity: Severity, actor: Option<&str>, text: impl Into<String>) {
        let text = text.into();
        let actor_label = actor.unwrap_or("-");
        match severity {
            Severity::Normal => tracing::debug!(actor = actor_label, "{text}"),
            Severity::Warning => tracing::warn!(actor = actor_label, "{text}"),
            Severity::Error => tracing::error!(actor = actor_label, "{text}"),
        }

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp: Utc::now(),
            severity,
            actor: actor.map(String::from),
            text,
        });
    }

    /// Snapshot of the current entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Entries at or above a severity
    pub fn entries_at_least(&self, severity: Severity) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.severity >= severity)
            .cloned()
            .collect()
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if nothing has been logged
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_discards_oldest() {
        let log = MessageLog::new(2);
        log.add(Severity::Normal, None, "one");
        log.add(Severity::Warning, Some("tcc"), "two");
        log.add(Severity::Error, Some("tcc"), "three");

        let texts: Vec<_> = log.entries().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn test_filter_by_severity() {
        let log = MessageLog::new(10);
        log.add(Severity::Normal, None, "routine");
        log.add(Severity::Error, Some("apogee"), "failed");

        let errors = log.entries_at_least(Severity::Warning);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].actor.as_deref(), Some("apogee"));
    }
}
