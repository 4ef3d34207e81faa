use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::log_capture::{LogLevel, LogSource, LogState};

/// Fire-and-forget work whose failures are still observable: each one is
/// logged, pushed to the audit log stream and counted.
#[derive(Clone)]
pub struct DetachedTasks {
    logs: Arc<LogState>,
    failures: Arc<AtomicUsize>,
}

impl DetachedTasks {
    pub fn new(logs: Arc<LogState>) -> Self {
        Self {
            logs,
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawn<F>(&self, label: impl Into<String>, fut: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let logs = self.logs.clone();
        let failures = self.failures.clone();
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(task = %label, error = %e, "Detached task failed");
                logs.emit(
                    LogSource::Storage,
                    LogLevel::Warn,
                    format!("{label} failed: {e}"),
                )
                .await;
            }
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}
