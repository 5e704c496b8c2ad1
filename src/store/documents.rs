use crate::error::{PipelineError, PipelineResult};
use crate::models::{ClassificationStageStatus, DocumentRow, DocumentStatus};
use chrono::Utc;
use sqlx::SqlitePool;

/// Document half of the State Store (§4.A). Every status write is
/// compare-and-set on the row's current status so two workers racing the
/// same row can never both advance it.
#[derive(Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_pending(
        &self,
        folder_path: &str,
        filename: &str,
        mime: Option<&str>,
        size_bytes: Option<i64>,
        max_retries: i64,
    ) -> PipelineResult<i64> {
        let result = sqlx::query(
            "INSERT INTO documents (folder_path, filename, mime, size_bytes, status, classification_stage_status, max_retries)
             VALUES (?, ?, ?, ?, 'pending', 'pending', ?)",
        )
        .bind(folder_path)
        .bind(filename)
        .bind(mime)
        .bind(size_bytes)
        .bind(max_retries)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> PipelineResult<DocumentRow> {
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {id}")))
    }

    pub async fn list_by_status(&self, status: DocumentStatus, limit: i64) -> PipelineResult<Vec<DocumentRow>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE status = ? ORDER BY id LIMIT ?",
        )
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rows whose status is in the progressing set and have gone stale,
    /// for the orchestrator's stuck-row sweep (§4.G.1c).
    pub async fn list_stuck(&self, stuck_threshold_secs: i64) -> PipelineResult<Vec<DocumentRow>> {
        let placeholders = DocumentStatus::PROGRESSING.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM documents WHERE status IN ({placeholders}) AND updated_at < datetime('now', ?)"
        );
        let mut query = sqlx::query_as::<_, DocumentRow>(&sql);
        for s in DocumentStatus::PROGRESSING {
            query = query.bind(s.to_string());
        }
        query = query.bind(format!("-{stuck_threshold_secs} seconds"));
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Rows whose classification-branch column has gone stale, for the
    /// orchestrator's stuck-row sweep. The main `status` sweep above never
    /// sees these since the branch advances independently (§4.G.1c).
    pub async fn list_stuck_classification_branch(&self, stuck_threshold_secs: i64) -> PipelineResult<Vec<DocumentRow>> {
        let placeholders =
            ClassificationStageStatus::PROGRESSING.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM documents WHERE classification_stage_status IN ({placeholders}) AND updated_at < datetime('now', ?)"
        );
        let mut query = sqlx::query_as::<_, DocumentRow>(&sql);
        for s in ClassificationStageStatus::PROGRESSING {
            query = query.bind(s.to_string());
        }
        query = query.bind(format!("-{stuck_threshold_secs} seconds"));
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Compare-and-set the main status column. Fails (0 rows affected) if
    /// another worker already moved the row off `from`.
    pub async fn cas_status(&self, id: i64, from: DocumentStatus, to: DocumentStatus) -> PipelineResult<bool> {
        if !from.can_advance_to(to) {
            return Err(PipelineError::IllegalTransition {
                document_id: id,
                from: from.to_string(),
                attempted: "cas_status",
            });
        }
        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ? AND status = ?",
        )
        .bind(to.to_string())
        .bind(id)
        .bind(from.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Compare-and-set the independently-tracked classification-scoring
    /// branch column (see `models::document` module docs).
    pub async fn cas_classification_stage_status(
        &self,
        id: i64,
        from: ClassificationStageStatus,
        to: ClassificationStageStatus,
    ) -> PipelineResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET classification_stage_status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ? AND classification_stage_status = ?",
        )
        .bind(to.to_string())
        .bind(id)
        .bind(from.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_extracted_text(&self, id: i64, text: &str) -> PipelineResult<()> {
        sqlx::query("UPDATE documents SET extracted_text = ? WHERE id = ?")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_classification(
        &self,
        id: i64,
        document_type: &str,
        confidence: f64,
        reasoning: &str,
    ) -> PipelineResult<()> {
        sqlx::query(
            "UPDATE documents SET document_type = ?, classification_confidence = ?, classification_reasoning = ? WHERE id = ?",
        )
        .bind(document_type)
        .bind(confidence)
        .bind(reasoning)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_summary(&self, id: i64, summary: &str, structured_data: &serde_json::Value) -> PipelineResult<()> {
        let json = serde_json::to_string(structured_data).map_err(|e| PipelineError::Schema {
            source: "summarize",
            detail: e.to_string(),
        })?;
        sqlx::query("UPDATE documents SET summary = ?, structured_data = ? WHERE id = ?")
            .bind(summary)
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_processing_started(&self, id: i64) -> PipelineResult<()> {
        sqlx::query("UPDATE documents SET processing_started_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a transient failure: bumps retry_count and resets status to
    /// `reset_to` for redispatch, or escalates to permanently_failed if the
    /// retry ceiling is reached (§7 error kind 1). Returns whether it
    /// escalated. Clears the schema-error streak, since this row is no
    /// longer mid-streak once a non-schema error lands on it.
    pub async fn record_retry_or_fail(
        &self,
        id: i64,
        reset_to: DocumentStatus,
        error: &str,
    ) -> PipelineResult<bool> {
        let row = self.get(id).await?;
        let next_retry = row.retry_count + 1;
        let escalated = next_retry >= row.max_retries;
        let next_status = if escalated { DocumentStatus::PermanentlyFailed } else { reset_to };
        sqlx::query(
            "UPDATE documents SET status = ?, retry_count = ?, last_error = ?, last_error_kind = NULL, consecutive_error_count = 0 WHERE id = ?",
        )
        .bind(next_status.to_string())
        .bind(next_retry)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(escalated)
    }

    /// Escalation rule for `ErrorKind::Schema` (§7): the generic retry
    /// ceiling still applies, but two consecutive schema errors on the same
    /// row escalate regardless of how much retry budget remains. A
    /// non-schema error in between resets the streak (`record_retry_or_fail`
    /// clears it), so this only counts runs of schema errors uninterrupted
    /// by any other kind.
    pub async fn record_schema_error_or_fail(
        &self,
        id: i64,
        reset_to: DocumentStatus,
        error: &str,
    ) -> PipelineResult<bool> {
        let row = self.get(id).await?;
        let consecutive = if row.last_error_kind.as_deref() == Some("schema") {
            row.consecutive_error_count + 1
        } else {
            1
        };
        let next_retry = row.retry_count + 1;
        let escalated = consecutive >= 2 || next_retry >= row.max_retries;
        let next_status = if escalated { DocumentStatus::PermanentlyFailed } else { reset_to };
        sqlx::query(
            "UPDATE documents SET status = ?, retry_count = ?, last_error = ?, last_error_kind = 'schema', consecutive_error_count = ? WHERE id = ?",
        )
        .bind(next_status.to_string())
        .bind(next_retry)
        .bind(error)
        .bind(consecutive)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(escalated)
    }

    /// Resets a stuck classification-branch row to its retry predecessor, or
    /// escalates the whole document to `permanently_failed` at the shared
    /// retry ceiling — both columns draw from the same `retry_count`/
    /// `max_retries` pair (§7).
    pub async fn record_classification_branch_retry_or_fail(
        &self,
        id: i64,
        reset_to: ClassificationStageStatus,
        error: &str,
    ) -> PipelineResult<bool> {
        let row = self.get(id).await?;
        let next_retry = row.retry_count + 1;
        let escalated = next_retry >= row.max_retries;
        if escalated {
            sqlx::query("UPDATE documents SET status = ?, retry_count = ?, last_error = ? WHERE id = ?")
                .bind(DocumentStatus::PermanentlyFailed.to_string())
                .bind(next_retry)
                .bind(error)
                .bind(id)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query(
                "UPDATE documents SET classification_stage_status = ?, retry_count = ?, last_error = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
            )
            .bind(reset_to.to_string())
            .bind(next_retry)
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        }
        Ok(escalated)
    }

    /// Forces a document back to `pending` for targeted reprocessing (§6
    /// "process-one"), ignoring its current status gate — including
    /// `permanently_failed` — and gives it a fresh retry budget, since a
    /// manual reprocess is a new attempt rather than a continuation of the
    /// old one. Resets the classification branch too, so the fan-out join
    /// doesn't wait forever on a branch that already finished last time.
    pub async fn reset_for_reprocessing(&self, id: i64) -> PipelineResult<()> {
        sqlx::query(
            "UPDATE documents SET status = 'pending', classification_stage_status = 'pending',
                retry_count = 0, last_error = NULL, last_error_kind = NULL, consecutive_error_count = 0,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_permanently_failed(&self, id: i64, error: &str) -> PipelineResult<()> {
        sqlx::query("UPDATE documents SET status = ?, last_error = ? WHERE id = ?")
            .bind(DocumentStatus::PermanentlyFailed.to_string())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Distinct document types seen so far, for Classify's "enumerated known
    /// document types" LLM input (§4.B.2).
    pub async fn known_document_types(&self) -> PipelineResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT document_type FROM documents WHERE document_type IS NOT NULL ORDER BY document_type",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    pub async fn count_by_document_type(&self, document_type: &str) -> PipelineResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE document_type = ?")
            .bind(document_type)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn cas_status_rejects_concurrent_winner() {
        let pool = create_test_pool().await;
        let store = DocumentStore::new(pool);
        let id = store.insert_pending("f", "a.jpg", None, None, 3).await.unwrap();

        let won = store.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
        assert!(won);

        let lost = store.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
        assert!(!lost);
    }

    #[tokio::test]
    async fn cas_status_rejects_illegal_edge() {
        let pool = create_test_pool().await;
        let store = DocumentStore::new(pool);
        let id = store.insert_pending("f", "a.jpg", None, None, 3).await.unwrap();

        let err = store.cas_status(id, DocumentStatus::Pending, DocumentStatus::Filed).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn record_retry_or_fail_escalates_at_ceiling() {
        let pool = create_test_pool().await;
        let store = DocumentStore::new(pool);
        let id = store.insert_pending("f", "a.jpg", None, None, 1).await.unwrap();

        store.record_retry_or_fail(id, DocumentStatus::Pending, "boom").await.unwrap();
        let row = store.get(id).await.unwrap();
        assert_eq!(row.status().unwrap(), DocumentStatus::PermanentlyFailed);
        assert_eq!(row.retry_count, 1);
    }

    #[tokio::test]
    async fn schema_error_escalates_on_second_consecutive_occurrence_before_retry_ceiling() {
        let pool = create_test_pool().await;
        let store = DocumentStore::new(pool);
        let id = store.insert_pending("f", "a.jpg", None, None, 10).await.unwrap();

        let first = store.record_schema_error_or_fail(id, DocumentStatus::Classified, "bad json").await.unwrap();
        assert!(!first);
        let row = store.get(id).await.unwrap();
        assert_eq!(row.status().unwrap(), DocumentStatus::Classified);

        let second = store.record_schema_error_or_fail(id, DocumentStatus::Classified, "bad json again").await.unwrap();
        assert!(second);
        let row = store.get(id).await.unwrap();
        assert_eq!(row.status().unwrap(), DocumentStatus::PermanentlyFailed);
        assert!(row.retry_count < row.max_retries);
    }

    #[tokio::test]
    async fn non_schema_error_resets_the_schema_streak() {
        let pool = create_test_pool().await;
        let store = DocumentStore::new(pool);
        let id = store.insert_pending("f", "a.jpg", None, None, 10).await.unwrap();

        store.record_schema_error_or_fail(id, DocumentStatus::Classified, "bad json").await.unwrap();
        store.record_retry_or_fail(id, DocumentStatus::Classified, "timeout").await.unwrap();

        let escalated = store.record_schema_error_or_fail(id, DocumentStatus::Classified, "bad json").await.unwrap();
        assert!(!escalated);
    }

    #[tokio::test]
    async fn reset_for_reprocessing_overrides_permanently_failed() {
        let pool = create_test_pool().await;
        let store = DocumentStore::new(pool);
        let id = store.insert_pending("f", "a.jpg", None, None, 1).await.unwrap();
        store.record_retry_or_fail(id, DocumentStatus::Pending, "boom").await.unwrap();
        assert_eq!(store.get(id).await.unwrap().status().unwrap(), DocumentStatus::PermanentlyFailed);

        store.reset_for_reprocessing(id).await.unwrap();
        let row = store.get(id).await.unwrap();
        assert_eq!(row.status().unwrap(), DocumentStatus::Pending);
        assert_eq!(row.classification_stage_status().unwrap(), ClassificationStageStatus::Pending);
        assert_eq!(row.retry_count, 0);
    }
}
