use crate::error::{PipelineError, PipelineResult};
use crate::models::{PromptRow, PromptType};
use sqlx::SqlitePool;

/// Prompt Registry persistence (§4.H). `document_type` is `None` for prompt
/// types that aren't scoped to a document type.
#[derive(Clone)]
pub struct PromptStore {
    pool: SqlitePool,
}

impl PromptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_active(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<Option<PromptRow>> {
        let row = sqlx::query_as::<_, PromptRow>(
            "SELECT * FROM prompts WHERE prompt_type = ? AND document_type IS ? AND is_active = 1",
        )
        .bind(prompt_type.to_string())
        .bind(document_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn seed_initial(
        &self,
        prompt_type: PromptType,
        document_type: Option<&str>,
        prompt_text: &str,
        can_evolve: bool,
        score_ceiling: Option<f64>,
        regenerates_on_update: bool,
    ) -> PipelineResult<i64> {
        let result = sqlx::query(
            "INSERT INTO prompts (prompt_type, document_type, version, prompt_text, can_evolve, score_ceiling, regenerates_on_update, is_active)
             VALUES (?, ?, 1, ?, ?, ?, ?, 1)",
        )
        .bind(prompt_type.to_string())
        .bind(document_type)
        .bind(prompt_text)
        .bind(can_evolve)
        .bind(score_ceiling)
        .bind(regenerates_on_update)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// The evolution transaction (§4.H): deactivate the old active row,
    /// insert the next version active, and — in the same transaction, so a
    /// crash can never leave the new prompt active with stale files left
    /// behind — cascade-invalidate `cascade_document_type`'s files if the
    /// row being replaced has `regenerates_on_update` set. Returns the new
    /// row and whether the cascade fired.
    pub async fn evolve(
        &self,
        active: &PromptRow,
        suggested_prompt_text: &str,
        new_score: f64,
        cascade_document_type: &str,
    ) -> PipelineResult<(PromptRow, bool)> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE prompts SET is_active = 0 WHERE id = ?")
            .bind(active.id)
            .execute(&mut *tx)
            .await?;

        let next_version = active.version + 1;
        let result = sqlx::query(
            "INSERT INTO prompts (prompt_type, document_type, version, prompt_text, performance_score, can_evolve, score_ceiling, regenerates_on_update, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&active.prompt_type)
        .bind(&active.document_type)
        .bind(next_version)
        .bind(suggested_prompt_text)
        .bind(new_score)
        .bind(active.can_evolve)
        .bind(active.score_ceiling)
        .bind(active.regenerates_on_update)
        .execute(&mut *tx)
        .await?;

        let new_id = result.last_insert_rowid();

        let triggers_cascade = active.regenerates_on_update;
        if triggers_cascade {
            super::files::invalidate_files_for_document_type_exec(&mut *tx, cascade_document_type).await?;
        }

        tx.commit().await?;

        let new_row = sqlx::query_as::<_, PromptRow>("SELECT * FROM prompts WHERE id = ?")
            .bind(new_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((new_row, triggers_cascade))
    }

    pub async fn list_versions(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<Vec<PromptRow>> {
        let rows = sqlx::query_as::<_, PromptRow>(
            "SELECT * FROM prompts WHERE prompt_type = ? AND document_type IS ? ORDER BY version",
        )
        .bind(prompt_type.to_string())
        .bind(document_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn deactivate(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<()> {
        sqlx::query("UPDATE prompts SET is_active = 0 WHERE prompt_type = ? AND document_type IS ? AND is_active = 1")
            .bind(prompt_type.to_string())
            .bind(document_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn require_active(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<PromptRow> {
        self.get_active(prompt_type, document_type)
            .await?
            .ok_or_else(|| {
                PipelineError::Domain(format!(
                    "no active {prompt_type} prompt for scope {document_type:?} and no fallback"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn evolve_deactivates_old_and_activates_new() {
        let pool = create_test_pool().await;
        let store = PromptStore::new(pool);
        store.seed_initial(PromptType::Classifier, Some("bill"), "classify v1", true, None, false).await.unwrap();

        let active = store.get_active(PromptType::Classifier, Some("bill")).await.unwrap().unwrap();
        assert!(active.should_evolve(0.90));

        let (new_row, cascades) = store.evolve(&active, "classify v2", 0.90, "bill").await.unwrap();
        assert_eq!(new_row.version, 2);
        assert!(new_row.is_active);
        assert!(!cascades);

        let versions = store.list_versions(PromptType::Classifier, Some("bill")).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(!versions[0].is_active);
        assert!(versions[1].is_active);
    }

    #[tokio::test]
    async fn evolve_with_regenerates_on_update_flips_the_document_types_files_in_the_same_call() {
        let pool = create_test_pool().await;
        let store = PromptStore::new(pool.clone());
        store.seed_initial(PromptType::Summarizer, Some("bill"), "summarize v1", true, None, true).await.unwrap();
        let active = store.get_active(PromptType::Summarizer, Some("bill")).await.unwrap().unwrap();

        sqlx::query("INSERT INTO documents (folder_path, filename, status, document_type, classification_stage_status) VALUES ('f', 'a.jpg', 'completed', 'bill', 'scored')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO files (id, tags, tag_signature, source, status) VALUES (1, '[]', 'sig', 'llm', 'generated')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO document_files (document_id, file_id) VALUES (1, 1)").execute(&pool).await.unwrap();

        let (_new_row, cascades) = store.evolve(&active, "summarize v2", 0.95, "bill").await.unwrap();
        assert!(cascades);

        let (status,): (String,) = sqlx::query_as("SELECT status FROM files WHERE id = 1").fetch_one(&pool).await.unwrap();
        assert_eq!(status, "outdated");
    }
}
