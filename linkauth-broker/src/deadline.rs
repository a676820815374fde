//! Bounded waits on store and provider calls

use std::future::Future;
use std::time::Duration;

use crate::error::BrokerError;

/// Per-call limits for remote operations
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub store: Duration,
    pub provider: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_millis(5_000),
            provider: Duration::from_millis(10_000),
        }
    }
}

/// Run `fut`, failing with `BrokerError::Timeout(what)` once `limit` elapses
pub async fn with_deadline<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, BrokerError>
where
    F: Future<Output = Result<T, BrokerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = what, limit_ms = limit.as_millis() as u64, "Deadline elapsed");
            Err(BrokerError::Timeout(what))
        }
    }
}
