use crate::error::{PipelineError, PipelineResult};
use crate::models::{RecordSource, SeriesDetectResult, SeriesRow};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct SeriesStore {
    pool: SqlitePool,
}

impl SeriesStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Finds-or-creates the series matching `(entity, series_type, owner)`
    /// (§8 property 7: two detect calls agreeing on that tuple always map to
    /// the same row). `owner` is always `None` in this deployment.
    pub async fn find_or_create(&self, detected: &SeriesDetectResult) -> PipelineResult<SeriesRow> {
        let metadata_json = serde_json::to_string(&detected.metadata).unwrap_or_else(|_| "null".to_string());

        sqlx::query(
            "INSERT INTO series (title, entity, series_type, owner, frequency, description, metadata, source)
             VALUES (?, ?, ?, '', ?, ?, ?, 'llm')
             ON CONFLICT(entity, series_type, owner) DO NOTHING",
        )
        .bind(&detected.title)
        .bind(&detected.entity)
        .bind(&detected.series_type)
        .bind(&detected.frequency)
        .bind(&detected.description)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, SeriesRow>(
            "SELECT * FROM series WHERE entity = ? AND series_type = ? AND owner = ''",
        )
        .bind(&detected.entity)
        .bind(&detected.series_type)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("series {}:{}", detected.entity, detected.series_type)))
    }

    pub async fn associate_document(&self, document_id: i64, series_id: i64, added_by: RecordSource) -> PipelineResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO document_series (document_id, series_id, added_by) VALUES (?, ?, ?)",
        )
        .bind(document_id)
        .bind(series_id)
        .bind(added_by.to_string())
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE series SET
                document_count = (SELECT COUNT(*) FROM document_series WHERE series_id = ?),
                last_document_date = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                first_document_date = COALESCE(first_document_date, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
             WHERE id = ?",
        )
        .bind(series_id)
        .bind(series_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn detect(entity: &str, series_type: &str) -> SeriesDetectResult {
        SeriesDetectResult {
            entity: entity.to_string(),
            series_type: series_type.to_string(),
            frequency: "monthly".to_string(),
            title: format!("{entity} {series_type}"),
            description: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn repeated_detects_map_to_the_same_series_row() {
        let pool = create_test_pool().await;
        let store = SeriesStore::new(pool);

        let a = store.find_or_create(&detect("Pacific Gas & Electric", "monthly_utility_bill")).await.unwrap();
        let b = store.find_or_create(&detect("Pacific Gas & Electric", "monthly_utility_bill")).await.unwrap();
        assert_eq!(a.id, b.id);
    }
}
