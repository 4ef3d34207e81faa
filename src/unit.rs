use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Why a unit produced no value. Never escalated on its own: the caller
/// decides what a failure means for its tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("{label} timed out after {timeout_ms}ms")]
    TimedOut { label: String, timeout_ms: u64 },

    #[error("{0}")]
    Failed(String),
}

impl UnitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, UnitError::TimedOut { .. })
    }
}

#[derive(Debug, Clone)]
pub struct UnitOutcome<T> {
    pub name: String,
    pub elapsed: Duration,
    pub result: Result<T, UnitError>,
}

/// Run one unit under `timeout`. The future is dropped when the deadline
/// passes, so a late result is discarded rather than delivered.
pub async fn run_unit<T, E, F>(name: &str, timeout: Duration, fut: F) -> UnitOutcome<T>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let start = Instant::now();
    let result = match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(UnitError::Failed(e.to_string())),
        Err(_) => Err(UnitError::TimedOut {
            label: name.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    };
    let elapsed = start.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;

    match &result {
        Ok(_) => info!(unit = name, elapsed_ms, "unit completed"),
        Err(e) => warn!(unit = name, elapsed_ms, error = %e, "unit failed"),
    }

    UnitOutcome {
        name: name.to_string(),
        elapsed,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let out = run_unit("ok", Duration::from_secs(1), async {
            Ok::<_, String>(42)
        })
        .await;
        assert_eq!(out.name, "ok");
        assert_eq!(out.result, Ok(42));
    }

    #[tokio::test]
    async fn test_failure_keeps_message() {
        let out = run_unit("bad", Duration::from_secs(1), async {
            Err::<u8, _>("upstream 500")
        })
        .await;
        assert_eq!(out.result, Err(UnitError::Failed("upstream 500".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_from_failure() {
        let out = run_unit("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, String>(())
        })
        .await;
        let err = out.result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "slow timed out after 50ms");
    }

    #[test]
    fn test_unit_error_is_a_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(UnitError::Failed("dns lookup failed".into()));
        assert_eq!(err.to_string(), "dns lookup failed");
    }
}
