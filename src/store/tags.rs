use crate::error::PipelineResult;
use crate::models::TagSource;
use crate::tags::normalize;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Normalizes, finds-or-creates the tag row, and associates it with the
    /// document. Two distinct sources producing the same logical tag collapse
    /// to one `tags` row (§8 property 6) via `INSERT OR IGNORE` + re-select.
    pub async fn tag_document(&self, document_id: i64, raw_tag: &str, source: TagSource) -> PipelineResult<()> {
        let normalized = normalize(raw_tag);

        sqlx::query("INSERT OR IGNORE INTO tags (tag_normalized) VALUES (?)")
            .bind(&normalized)
            .execute(&self.pool)
            .await?;

        let (tag_id,): (i64,) = sqlx::query_as("SELECT id FROM tags WHERE tag_normalized = ?")
            .bind(&normalized)
            .fetch_one(&self.pool)
            .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO document_tags (document_id, tag_id, source) VALUES (?, ?, ?)",
        )
        .bind(document_id)
        .bind(tag_id)
        .bind(source.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn tags_for_document(&self, document_id: i64) -> PipelineResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT t.tag_normalized FROM tags t
             JOIN document_tags dt ON dt.tag_id = t.id
             WHERE dt.document_id = ? ORDER BY t.tag_normalized",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    pub async fn top_popular_tags(&self, limit: i64) -> PipelineResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT t.tag_normalized FROM tags t
             JOIN document_tags dt ON dt.tag_id = t.id
             GROUP BY t.id ORDER BY COUNT(*) DESC, t.tag_normalized LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::store::DocumentStore;

    #[tokio::test]
    async fn distinct_sources_collapse_to_one_tag_row() {
        let pool = create_test_pool().await;
        let docs = DocumentStore::new(pool.clone());
        let tags = TagStore::new(pool.clone());
        let id = docs.insert_pending("f", "a.jpg", None, None, 3).await.unwrap();

        tags.tag_document(id, "Utility", TagSource::Llm).await.unwrap();
        tags.tag_document(id, "utility", TagSource::System).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE tag_normalized = 'utility'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let list = tags.tags_for_document(id).await.unwrap();
        assert_eq!(list, vec!["utility".to_string()]);
    }
}
