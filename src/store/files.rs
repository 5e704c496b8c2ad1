use crate::error::{PipelineError, PipelineResult};
use crate::models::{FileRow, FileStatus};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct FileStore {
    pool: SqlitePool,
}

impl FileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> PipelineResult<FileRow> {
        sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("file {id}")))
    }

    pub async fn list_by_statuses(&self, statuses: &[FileStatus], limit: i64) -> PipelineResult<Vec<FileRow>> {
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM files WHERE status IN ({placeholders}) ORDER BY id LIMIT ?");
        let mut query = sqlx::query_as::<_, FileRow>(&sql);
        for s in statuses {
            query = query.bind(s.to_string());
        }
        query = query.bind(limit);
        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn list_stuck(&self, stuck_threshold_secs: i64) -> PipelineResult<Vec<FileRow>> {
        let placeholders = FileStatus::SWEEP_PROGRESSING.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM files WHERE status IN ({placeholders}) AND updated_at < datetime('now', ?)");
        let mut query = sqlx::query_as::<_, FileRow>(&sql);
        for s in FileStatus::SWEEP_PROGRESSING {
            query = query.bind(s.to_string());
        }
        query = query.bind(format!("-{stuck_threshold_secs} seconds"));
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Finds-or-creates the llm-sourced file whose signature is exactly
    /// `[series:<slug>]` (§4.B.6, §8 property 8: signature is a key for
    /// llm-sourced files only — user files may share one deliberately).
    pub async fn find_or_create_llm_file(&self, tags: &[String], tag_signature: &str) -> PipelineResult<FileRow> {
        let tags_json = serde_json::to_string(tags).unwrap_or_default();

        sqlx::query(
            "INSERT INTO files (tags, tag_signature, source, status)
             VALUES (?, ?, 'llm', 'pending')
             ON CONFLICT(tag_signature) WHERE source = 'llm' DO NOTHING",
        )
        .bind(&tags_json)
        .bind(tag_signature)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE tag_signature = ? AND source = 'llm'")
            .bind(tag_signature)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("file {tag_signature}")))
    }

    pub async fn associate_document(&self, document_id: i64, file_id: i64) -> PipelineResult<()> {
        sqlx::query("INSERT OR IGNORE INTO document_files (document_id, file_id) VALUES (?, ?)")
            .bind(document_id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn member_document_ids(&self, file_id: i64) -> PipelineResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT d.id FROM documents d
             JOIN document_files df ON df.document_id = d.id
             WHERE df.file_id = ? ORDER BY d.created_at DESC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Files `document_id` already belongs to, for the per-document
    /// tag-signature re-check (§4.I.2).
    pub async fn file_ids_for_document(&self, document_id: i64) -> PipelineResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT file_id FROM document_files WHERE document_id = ?")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Flips a single file to `outdated` unless it's mid-generation.
    /// Returns whether it actually flipped.
    pub async fn mark_outdated_if_eligible(&self, id: i64) -> PipelineResult<bool> {
        let result = sqlx::query(
            "UPDATE files SET status = 'outdated', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ? AND status NOT IN ('generating', 'regenerating')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn cas_status(&self, id: i64, from: FileStatus, to: FileStatus) -> PipelineResult<bool> {
        let result = sqlx::query(
            "UPDATE files SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ? AND status = ?",
        )
        .bind(to.to_string())
        .bind(id)
        .bind(from.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_summary(&self, id: i64, summary_text: &str, metadata: &serde_json::Value) -> PipelineResult<()> {
        let json = serde_json::to_string(metadata).map_err(|e| PipelineError::Schema {
            source: "file_summarize",
            detail: e.to_string(),
        })?;
        sqlx::query(
            "UPDATE files SET summary_text = ?, summary_metadata = ?, last_generated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
        )
        .bind(summary_text)
        .bind(json)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cascade hook for prompt evolution's `regenerates_on_update` (§4.H):
    /// flips every file that has at least one member document under the
    /// given document type to `outdated`, regardless of its current status.
    pub async fn invalidate_files_for_document_type(&self, document_type: &str) -> PipelineResult<u64> {
        Ok(invalidate_files_for_document_type_exec(&self.pool, document_type).await?)
    }

    pub async fn mark_permanently_failed(&self, id: i64, error: &str) -> PipelineResult<()> {
        sqlx::query("UPDATE files SET status = ?, last_error = ? WHERE id = ?")
            .bind(FileStatus::PermanentlyFailed.to_string())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns whether the row escalated to `permanently_failed`. Clears the
    /// schema-error streak (see `record_schema_error_or_fail`).
    pub async fn record_retry_or_fail(&self, id: i64, reset_to: FileStatus, error: &str) -> PipelineResult<bool> {
        let row = self.get(id).await?;
        let next_retry = row.retry_count + 1;
        let escalated = next_retry >= row.max_retries;
        let status = if escalated { FileStatus::PermanentlyFailed } else { reset_to };
        sqlx::query(
            "UPDATE files SET status = ?, retry_count = ?, last_error = ?, last_error_kind = NULL, consecutive_error_count = 0 WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(next_retry)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(escalated)
    }

    /// Escalation rule for `ErrorKind::Schema` (§7): two consecutive schema
    /// errors on the same row escalate regardless of retry budget (see
    /// `DocumentStore::record_schema_error_or_fail`, the same rule applied
    /// to files).
    pub async fn record_schema_error_or_fail(&self, id: i64, reset_to: FileStatus, error: &str) -> PipelineResult<bool> {
        let row = self.get(id).await?;
        let consecutive = if row.last_error_kind.as_deref() == Some("schema") {
            row.consecutive_error_count + 1
        } else {
            1
        };
        let next_retry = row.retry_count + 1;
        let escalated = consecutive >= 2 || next_retry >= row.max_retries;
        let status = if escalated { FileStatus::PermanentlyFailed } else { reset_to };
        sqlx::query(
            "UPDATE files SET status = ?, retry_count = ?, last_error = ?, last_error_kind = 'schema', consecutive_error_count = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(next_retry)
        .bind(error)
        .bind(consecutive)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(escalated)
    }
}

/// Shared with [`crate::store::prompts::PromptStore::evolve`] so the
/// `regenerates_on_update` cascade can run inside that method's transaction
/// instead of as a separate, non-transactional call (§4.H).
pub(crate) async fn invalidate_files_for_document_type_exec<'e, E>(
    executor: E,
    document_type: &str,
) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        "UPDATE files SET status = 'outdated', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id IN (
             SELECT DISTINCT df.file_id FROM document_files df
             JOIN documents d ON d.id = df.document_id
             WHERE d.document_type = ?
         ) AND status NOT IN ('generating', 'regenerating')",
    )
    .bind(document_type)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
