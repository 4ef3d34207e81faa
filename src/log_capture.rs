use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::config::LOG_BUFFER_SIZE;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Pipeline,
    Collector,
    Analyser,
    Synthesis,
    Storage,
    Http,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// Bounded in-memory audit event log. New entries are also broadcast to
/// live `/logs/stream` subscribers.
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    sender: broadcast::Sender<LogEntry>,
}

impl Default for LogState {
    fn default() -> Self {
        Self::new()
    }
}

impl LogState {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(LOG_BUFFER_SIZE))),
            sender,
        }
    }

    pub async fn push(&self, entry: LogEntry) {
        let mut buf = self.buffer.write().await;
        if buf.len() >= LOG_BUFFER_SIZE {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        drop(buf);

        let _ = self.sender.send(entry);
    }

    pub async fn history(&self) -> Vec<LogEntry> {
        self.buffer.read().await.iter().cloned().collect()
    }

    /// Entries for a single audit, oldest first.
    pub async fn history_for(&self, audit_id: &str) -> Vec<LogEntry> {
        self.buffer
            .read()
            .await
            .iter()
            .filter(|e| e.audit_id.as_deref() == Some(audit_id))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    pub async fn emit(&self, source: LogSource, level: LogLevel, message: impl Into<String>) {
        self.push(LogEntry {
            timestamp: Utc::now(),
            source,
            level,
            audit_id: None,
            message: message.into(),
        })
        .await;
    }

    pub async fn emit_for(
        &self,
        audit_id: &str,
        source: LogSource,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        self.push(LogEntry {
            timestamp: Utc::now(),
            source,
            level,
            audit_id: Some(audit_id.to_string()),
            message: message.into(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ring_buffer_drops_oldest() {
        let logs = LogState::new();
        for i in 0..(LOG_BUFFER_SIZE + 3) {
            logs.emit(LogSource::Pipeline, LogLevel::Info, format!("m{i}"))
                .await;
        }
        let history = logs.history().await;
        assert_eq!(history.len(), LOG_BUFFER_SIZE);
        assert_eq!(history[0].message, "m3");
    }

    #[tokio::test]
    async fn test_history_for_filters_by_audit() {
        let logs = LogState::new();
        logs.emit_for("a1", LogSource::Collector, LogLevel::Warn, "x")
            .await;
        logs.emit_for("a2", LogSource::Collector, LogLevel::Info, "y")
            .await;
        logs.emit(LogSource::Http, LogLevel::Info, "z").await;

        let only_a1 = logs.history_for("a1").await;
        assert_eq!(only_a1.len(), 1);
        assert_eq!(only_a1[0].message, "x");
    }

    #[tokio::test]
    async fn test_subscribers_receive_new_entries() {
        let logs = LogState::new();
        let mut rx = logs.subscribe();
        logs.emit(LogSource::Synthesis, LogLevel::Error, "boom").await;
        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.source, LogSource::Synthesis);
    }
}
