//! S1: a single bill-type document drives the whole Document Flow to
//! `completed`, lands in a detected series, and is filed under an
//! llm-sourced aggregate file keyed by that series' tag.

use crate::flows;
use crate::models::{ClassificationResult, DocumentStatus, SeriesDetectResult, SummarizeResult};
use crate::tests::common::*;
use wiremock::MockServer;

#[tokio::test]
async fn single_bill_reaches_completed_with_series_and_file() {
    let llm_server = MockServer::start().await;
    let ocr_server = MockServer::start().await;
    let (ctx, pool) = build_context(&llm_server.uri(), &ocr_server.uri()).await;
    seed_default_prompts(&ctx).await;

    mount_ocr(&ocr_server, "PG&E Energy Statement account 1234 amount due $125.43").await;

    ScriptedLlmResponder::new()
        .on(
            is_classify_request,
            serde_json::to_value(ClassificationResult {
                document_type: "bill".to_string(),
                confidence: 0.92,
                reasoning: "looks like a utility bill".to_string(),
                tags: vec!["utility".to_string(), "pge".to_string()],
            })
            .unwrap(),
        )
        .on(
            is_summarize_request,
            serde_json::to_value(SummarizeResult {
                summary: "PG&E bill $125.43 due 2024-12-15".to_string(),
                structured_data: serde_json::json!({"vendor": "PG&E", "amount": 125.43}),
            })
            .unwrap(),
        )
        .on(
            is_series_detect_request,
            serde_json::to_value(SeriesDetectResult {
                entity: "Pacific Gas & Electric".to_string(),
                series_type: "monthly_utility_bill".to_string(),
                frequency: "monthly".to_string(),
                title: "PG&E monthly bill".to_string(),
                description: None,
                metadata: serde_json::json!({}),
            })
            .unwrap(),
        )
        .mount(&llm_server)
        .await;

    let document_id = ctx.documents.insert_pending("inbox/d1", "d1.jpg", Some("image/jpeg"), None, 3).await.unwrap();

    let cancel = cancel_token();
    flows::document_flow(&ctx, document_id, &cancel).await;

    let document = ctx.documents.get(document_id).await.unwrap();
    assert_eq!(document.status().unwrap(), DocumentStatus::Completed);
    assert_eq!(document.document_type.as_deref(), Some("bill"));

    // Fewer than 5 "bill" documents exist, so Score-Classification and
    // Score-Summary both skip their LLM call (§4.B.3) and the seeded
    // prompts never evolve.
    let classifier = ctx.prompts.get_active(crate::models::PromptType::Classifier, None).await.unwrap().unwrap();
    assert_eq!(classifier.version, 1);

    let (series_id, entity, series_type): (i64, String, String) =
        sqlx::query_as("SELECT id, entity, series_type FROM series")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(entity, "Pacific Gas & Electric");
    assert_eq!(series_type, "monthly_utility_bill");

    let member_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM document_series WHERE series_id = ? AND document_id = ?")
        .bind(series_id)
        .bind(document_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(member_count.0, 1);

    let (file_id, tag_signature): (i64, String) =
        sqlx::query_as("SELECT id, tag_signature FROM files WHERE tag_signature = 'series:pacific-gas-and-electric'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(tag_signature, "series:pacific-gas-and-electric");

    let file_member_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM document_files WHERE file_id = ? AND document_id = ?")
            .bind(file_id)
            .bind(document_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(file_member_count.0, 1);
}
