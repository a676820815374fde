//! Expiry sweeper
//!
//! Expired sessions, login tokens and merge tokens are collected first and
//! then deleted in fixed-size batches. A failed batch does not stop the rest;
//! the last error is returned once every batch has been attempted.

use std::future::Future;

use serde::Serialize;

use super::{connection_ttl, registration_ttl, session_ttl, Caller, SWEEP_BATCH_SIZE};
use crate::error::BrokerError;
use crate::state::AppState;
use crate::store::{SessionStore, StoreResult, UserStore};

/// Outcome of one batched sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records found past their TTL
    pub matched: usize,
    pub deleted: u64,
    pub failed_batches: usize,
}

/// Delete `items` in chunks of `batch_size`, attempting every chunk
pub async fn delete_in_batches<'a, T, F, Fut>(
    items: &'a [T],
    batch_size: usize,
    mut delete: F,
) -> Result<SweepReport, BrokerError>
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = StoreResult<u64>>,
{
    let mut report = SweepReport {
        matched: items.len(),
        ..SweepReport::default()
    };
    let mut last_error = None;

    for (index, batch) in items.chunks(batch_size.max(1)).enumerate() {
        match delete(batch).await {
            Ok(deleted) => report.deleted += deleted,
            Err(e) => {
                tracing::warn!(batch = index, size = batch.len(), error = %e, "Sweep batch failed");
                report.failed_batches += 1;
                last_error = Some(e);
            }
        }
    }

    tracing::info!(
        matched = report.matched,
        deleted = report.deleted,
        failed_batches = report.failed_batches,
        "Sweep finished"
    );
    match last_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

impl<U: UserStore, S: SessionStore, E> AppState<U, S, E> {
    /// Delete sessions idle for longer than the session TTL
    pub async fn sweep_sessions(&self, caller: &Caller) -> Result<SweepReport, BrokerError> {
        caller.require_admin()?;

        let cutoff = self.clock.now() - session_ttl();
        let ids = self
            .store("session scan", self.session_store.sessions_used_before(cutoff))
            .await?;
        delete_in_batches(&ids, SWEEP_BATCH_SIZE, |batch| {
            self.store("session sweep", self.session_store.delete_sessions(batch))
        })
        .await
    }

    pub async fn sweep_login_tokens(&self, caller: &Caller) -> Result<SweepReport, BrokerError> {
        caller.require_admin()?;

        let tokens = self
            .store(
                "login token scan",
                self.session_store.login_tokens_expired_before(self.clock.now()),
            )
            .await?;
        delete_in_batches(&tokens, SWEEP_BATCH_SIZE, |batch| {
            self.store("login token sweep", self.session_store.delete_login_tokens(batch))
        })
        .await
    }

    pub async fn sweep_merge_tokens(&self, caller: &Caller) -> Result<SweepReport, BrokerError> {
        caller.require_admin()?;

        let tokens = self
            .store(
                "merge token scan",
                self.session_store.merge_tokens_expired_before(self.clock.now()),
            )
            .await?;
        delete_in_batches(&tokens, SWEEP_BATCH_SIZE, |batch| {
            self.store("merge token sweep", self.session_store.delete_merge_tokens(batch))
        })
        .await
    }

    /// Purge stale connections, registrations, resets and verifications
    pub async fn sweep_ephemeral(&self, caller: &Caller) -> Result<u64, BrokerError> {
        caller.require_admin()?;

        let now = self.clock.now();
        let purged = self
            .store(
                "ephemeral purge",
                self.user_store
                    .purge_ephemeral(now - connection_ttl(), now - registration_ttl(), now),
            )
            .await?;

        tracing::info!(purged, "Ephemeral records purged");
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_batches_of_500() {
        let items: Vec<u32> = (0..1200).collect();
        let sizes = Mutex::new(Vec::new());

        let report = delete_in_batches(&items, 500, |batch| {
            sizes.lock().unwrap().push(batch.len());
            let n = batch.len() as u64;
            async move { Ok(n) }
        })
        .await
        .unwrap();

        assert_eq!(*sizes.lock().unwrap(), vec![500, 500, 200]);
        assert_eq!(report.matched, 1200);
        assert_eq!(report.deleted, 1200);
        assert_eq!(report.failed_batches, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_rest() {
        let items: Vec<u32> = (0..1200).collect();
        let attempted = Mutex::new(Vec::new());

        let result = delete_in_batches(&items, 500, |batch| {
            let mut attempted = attempted.lock().unwrap();
            attempted.push(batch[0]);
            let fail = attempted.len() == 2;
            let n = batch.len() as u64;
            async move {
                if fail {
                    Err(BrokerError::Internal("batch 2 failed".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(*attempted.lock().unwrap(), vec![0, 500, 1000]);
        assert!(matches!(result, Err(BrokerError::Internal(msg)) if msg == "batch 2 failed"));
    }

    #[tokio::test]
    async fn test_nothing_to_sweep() {
        let items: Vec<String> = Vec::new();
        let report = delete_in_batches(&items, 500, |_| async { Ok(0) }).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
