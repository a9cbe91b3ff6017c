use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// One timestamped activity record. Never mutated once appended.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub category: String,
    pub message: String,
    pub data: Option<Value>,
}

/// Append-only activity ledger, owned by `main` and lent to each stage.
/// Every entry is mirrored to the console as it is recorded.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Vec<LogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry without a payload.
    pub fn note(&mut self, category: &str, message: impl Into<String>) {
        self.push(category, message.into(), None, false);
    }

    /// Record an entry with a structured payload.
    pub fn record(&mut self, category: &str, message: impl Into<String>, data: Value) {
        self.push(category, message.into(), Some(data), false);
    }

    /// Record a non-fatal problem. Same ledger, louder console line.
    pub fn warn(&mut self, category: &str, message: impl Into<String>, data: Option<Value>) {
        self.push(category, message.into(), data, true);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    fn push(&mut self, category: &str, message: String, data: Option<Value>, warning: bool) {
        let tag = category.to_uppercase();
        if category == "error" {
            error!(category, "[{}] {}", tag, message);
        } else if warning {
            warn!(category, "[{}] {}", tag, message);
        } else {
            info!(category, "[{}] {}", tag, message);
        }

        // Null payloads render the same as no payload.
        let data = data.filter(|d| !d.is_null());
        self.entries.push(LogEntry {
            timestamp: Local::now(),
            category: category.to_string(),
            message,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut log = ActivityLog::new();
        log.note("setup", "first");
        log.record("vector_store", "second", json!({"vector_store_id": "vs_1"}));
        log.warn("file_upload", "third", None);

        let categories: Vec<&str> = log.entries().iter().map(|e| e.category.as_str()).collect();
        assert_eq!(categories, vec!["setup", "vector_store", "file_upload"]);
        assert_eq!(log.entries()[1].data, Some(json!({"vector_store_id": "vs_1"})));
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);
    }

    #[test]
    fn test_null_payload_is_dropped() {
        let mut log = ActivityLog::new();
        log.record("run_complete", "done", Value::Null);
        assert_eq!(log.entries().len(), 1);
        assert!(log.entries()[0].data.is_none());
    }
}
