//! S3: Score-Classification returning a score that clears the active
//! prompt's improvement margin evolves it to a new, active version (§4.H).

use crate::models::{DocumentStatus, PromptType};
use crate::stages;
use crate::tests::common::*;
use wiremock::MockServer;

#[tokio::test]
async fn score_past_margin_evolves_classifier_prompt() {
    let llm_server = MockServer::start().await;
    let ocr_server = MockServer::start().await;
    let (ctx, pool) = build_context(&llm_server.uri(), &ocr_server.uri()).await;
    seed_default_prompts(&ctx).await;

    sqlx::query("UPDATE prompts SET performance_score = 0.80, score_ceiling = 0.95 WHERE prompt_type = 'classifier'")
        .execute(&pool)
        .await
        .unwrap();

    ScriptedLlmResponder::new()
        .on(
            |v: &serde_json::Value| v.get("confidence").is_some(),
            serde_json::json!({"score": 0.88, "suggested_prompt": "classify more precisely"}),
        )
        .mount(&llm_server)
        .await;

    let mut document_id = 0;
    for i in 0..5 {
        let id = ctx
            .documents
            .insert_pending(&format!("inbox/d{i}"), &format!("d{i}.jpg"), None, None, 3)
            .await
            .unwrap();
        ctx.documents.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
        ctx.documents.cas_status(id, DocumentStatus::OcrInProgress, DocumentStatus::OcrCompleted).await.unwrap();
        ctx.documents.cas_status(id, DocumentStatus::OcrCompleted, DocumentStatus::Classifying).await.unwrap();
        ctx.documents.set_classification(id, "invoice", 0.9, "looks like an invoice").await.unwrap();
        ctx.documents.cas_status(id, DocumentStatus::Classifying, DocumentStatus::Classified).await.unwrap();
        document_id = id;
    }

    let cancel = cancel_token();
    let outcome = stages::score_classification(&ctx, document_id, &cancel).await;
    assert_eq!(outcome, crate::stages::StageOutcome::Advanced);

    let versions = ctx.prompts.list_versions(PromptType::Classifier, None).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert!(!versions[0].is_active);
    assert_eq!(versions[0].version, 1);
    assert!(versions[1].is_active);
    assert_eq!(versions[1].version, 2);
    assert_eq!(versions[1].prompt_text, "classify more precisely");
    assert_eq!(versions[1].performance_score, Some(0.88));
}
