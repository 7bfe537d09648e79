//! Bounded activity log shown to the operator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Error,
    Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            severity,
        }
    }
}

/// Ring buffer of log entries; the oldest entry is evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Rebuild from persisted entries (oldest first), trimming to `capacity`.
    pub fn from_entries(capacity: usize, entries: Vec<LogEntry>) -> Self {
        let mut log = Self::with_capacity(capacity);
        for entry in entries {
            log.push(entry);
        }
        log
    }

    pub fn push(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first, the persisted order.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries newest first, the order readers display.
    pub fn newest_first(&self) -> Vec<LogEntry> {
        self.entries.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_keeps_most_recent_fifty() {
        let mut log = ActivityLog::default();
        for i in 0..120 {
            log.push(LogEntry::new(format!("entry {i}"), Severity::Info));
        }
        assert_eq!(log.len(), 50);
        let oldest = log.entries().next().unwrap();
        assert_eq!(oldest.message, "entry 70");
        assert_eq!(log.newest_first()[0].message, "entry 119");
    }

    #[test]
    fn reload_trims_to_capacity() {
        let entries = (0..10)
            .map(|i| LogEntry::new(i.to_string(), Severity::Action))
            .collect();
        let log = ActivityLog::from_entries(4, entries);
        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["6", "7", "8", "9"]);
    }

    #[test]
    fn severity_serializes_lowercase() {
        let entry = LogEntry::new("sent", Severity::Success);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "success");
    }
}
