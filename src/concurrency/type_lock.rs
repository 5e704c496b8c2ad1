use crate::error::{PipelineError, PipelineResult};
use crate::store::AdvisoryLockStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// `with_type_lock(type, ctx) { body }` (§4.D): mutual exclusion keyed by
/// document type, delegating to the State Store's advisory lock so the
/// guarantee survives process restart (§9 "advisory lock as serializer").
#[derive(Clone)]
pub struct PerTypeSerializer {
    locks: AdvisoryLockStore,
    poll_interval: Duration,
    wait_timeout: Duration,
    stale_after_secs: i64,
}

/// Held for the duration of the locked section. Release is best-effort and
/// fire-and-forget on drop since `Drop` can't await; every stage that takes
/// this guard also completes (or cancels) within the same task, so the
/// spawned release races nothing that depends on it. The background
/// heartbeat task is aborted first, so it never refreshes a row this guard
/// no longer holds.
pub struct TypeLockGuard {
    locks: AdvisoryLockStore,
    lock_key: String,
    holder_token: String,
    heartbeat_task: tokio::task::JoinHandle<()>,
}

impl Drop for TypeLockGuard {
    fn drop(&mut self) {
        self.heartbeat_task.abort();

        let locks = self.locks.clone();
        let lock_key = self.lock_key.clone();
        let holder_token = self.holder_token.clone();
        tokio::spawn(async move {
            if let Err(err) = locks.release(&lock_key, &holder_token).await {
                tracing::warn!(%lock_key, %err, "failed to release per-type lock");
            }
        });
    }
}

impl PerTypeSerializer {
    pub fn new(locks: AdvisoryLockStore, poll_interval: Duration, wait_timeout: Duration, stale_after_secs: i64) -> Self {
        Self { locks, poll_interval, wait_timeout, stale_after_secs }
    }

    /// Polls every `poll_interval` until the lock is free or `wait_timeout`
    /// elapses (-> `LockTimeout`, treated as transient per §7) or `cancel`
    /// fires (-> `Cancelled`).
    pub async fn acquire(&self, document_type: &str, cancel: &CancellationToken) -> PipelineResult<TypeLockGuard> {
        let lock_key = format!("doctype:{document_type}");
        let holder_token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + self.wait_timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if self.locks.try_acquire(&lock_key, &holder_token, self.stale_after_secs).await? {
                let heartbeat_task = self.spawn_heartbeat(lock_key.clone(), holder_token.clone());
                return Ok(TypeLockGuard { locks: self.locks.clone(), lock_key, holder_token, heartbeat_task });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PipelineError::LockTimeout(lock_key));
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Refreshes the holder's `heartbeat_at` at a third of `stale_after_secs`
    /// so a critical section several multiples longer than the staleness
    /// window never looks abandoned to a waiter's steal-sweep.
    fn spawn_heartbeat(&self, lock_key: String, holder_token: String) -> tokio::task::JoinHandle<()> {
        let locks = self.locks.clone();
        let interval = Duration::from_secs((self.stale_after_secs / 3).max(1) as u64);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = locks.heartbeat(&lock_key, &holder_token).await {
                    tracing::warn!(%lock_key, %err, "failed to refresh per-type lock heartbeat");
                }
            }
        })
    }
}
