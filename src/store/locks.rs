use crate::error::PipelineResult;
use chrono::Utc;
use sqlx::SqlitePool;

/// The State Store's advisory-lock primitive (§4.A, §4.D, §9 "advisory lock
/// as serializer"). SQLite has no `pg_advisory_lock`, so a lock is a row in
/// `advisory_locks` keyed by a logical string (a plain TEXT key rather than
/// Postgres's 64-bit integer key — SQLite rowids are already 64-bit and a
/// string key needs no hashing step). A lock is held by
/// inserting the row with a random holder token; it is released by deleting
/// the row scoped to that token, so a holder can never release someone
/// else's lock. Since there is no session/connection-scoped auto-release in
/// SQLite, staleness is approximated with a heartbeat: a row whose
/// `heartbeat_at` is older than `stale_after_secs` is considered abandoned
/// and may be stolen. See DESIGN.md.
#[derive(Clone)]
pub struct AdvisoryLockStore {
    pool: SqlitePool,
}

impl AdvisoryLockStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attempts to acquire `lock_key` for `holder_token`. Returns `true` on
    /// success, `false` if another live holder has it.
    pub async fn try_acquire(&self, lock_key: &str, holder_token: &str, stale_after_secs: i64) -> PipelineResult<bool> {
        let now = Utc::now();

        // Steal the row if the previous holder's heartbeat went stale.
        sqlx::query(
            "DELETE FROM advisory_locks WHERE lock_key = ? AND heartbeat_at < datetime('now', ?)",
        )
        .bind(lock_key)
        .bind(format!("-{stale_after_secs} seconds"))
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO advisory_locks (lock_key, holder_token, acquired_at, heartbeat_at) VALUES (?, ?, ?, ?)",
        )
        .bind(lock_key)
        .bind(holder_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn heartbeat(&self, lock_key: &str, holder_token: &str) -> PipelineResult<()> {
        sqlx::query("UPDATE advisory_locks SET heartbeat_at = ? WHERE lock_key = ? AND holder_token = ?")
            .bind(Utc::now())
            .bind(lock_key)
            .bind(holder_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Releases the lock, but only if still owned by `holder_token` — a
    /// stolen lock must not be released out from under its new holder.
    pub async fn release(&self, lock_key: &str, holder_token: &str) -> PipelineResult<()> {
        sqlx::query("DELETE FROM advisory_locks WHERE lock_key = ? AND holder_token = ?")
            .bind(lock_key)
            .bind(holder_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn second_acquirer_is_blocked_until_release() {
        let pool = create_test_pool().await;
        let store = AdvisoryLockStore::new(pool);

        assert!(store.try_acquire("doctype:bill", "holder-a", 300).await.unwrap());
        assert!(!store.try_acquire("doctype:bill", "holder-b", 300).await.unwrap());

        store.release("doctype:bill", "holder-a").await.unwrap();
        assert!(store.try_acquire("doctype:bill", "holder-b", 300).await.unwrap());
    }

    #[tokio::test]
    async fn stale_lock_can_be_stolen() {
        let pool = create_test_pool().await;
        let store = AdvisoryLockStore::new(pool);

        assert!(store.try_acquire("doctype:bill", "holder-a", 0).await.unwrap());
        // stale_after_secs = 0 means the steal-sweep fires on the very next
        // acquire attempt regardless of elapsed wall-clock time.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(store.try_acquire("doctype:bill", "holder-b", 0).await.unwrap());
    }

    #[tokio::test]
    async fn release_does_not_affect_a_different_holder() {
        let pool = create_test_pool().await;
        let store = AdvisoryLockStore::new(pool);

        assert!(store.try_acquire("doctype:bill", "holder-a", 300).await.unwrap());
        store.release("doctype:bill", "holder-b").await.unwrap();
        assert!(!store.try_acquire("doctype:bill", "holder-b", 300).await.unwrap());
    }
}
