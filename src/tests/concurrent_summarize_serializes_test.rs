//! S2: two documents of the same type never have overlapping Summarize
//! calls in flight — the per-type serializer (§4.D) holds the type lock for
//! the whole stage, not just the LLM call.

use crate::models::DocumentStatus;
use crate::stages;
use crate::tests::common::*;
use std::time::Duration;
use wiremock::MockServer;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_type_summarize_calls_never_overlap() {
    let llm_server = MockServer::start().await;
    let ocr_server = MockServer::start().await;
    let (ctx, _pool) = build_context(&llm_server.uri(), &ocr_server.uri()).await;
    seed_default_prompts(&ctx).await;

    let responder = ExclusiveLlmResponder::new(
        serde_json::json!({"summary": "a summary", "structured_data": {}}),
        Duration::from_millis(150),
    );
    let max_observed = responder.max_observed_concurrency.clone();
    responder.mount(&llm_server).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let id = ctx
            .documents
            .insert_pending(&format!("inbox/d{i}"), &format!("d{i}.jpg"), None, None, 3)
            .await
            .unwrap();
        ctx.documents.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
        ctx.documents.cas_status(id, DocumentStatus::OcrInProgress, DocumentStatus::OcrCompleted).await.unwrap();
        ctx.documents.cas_status(id, DocumentStatus::OcrCompleted, DocumentStatus::Classifying).await.unwrap();
        ctx.documents.set_classification(id, "bill", 0.9, "looks like a bill").await.unwrap();
        ctx.documents.cas_status(id, DocumentStatus::Classifying, DocumentStatus::Classified).await.unwrap();
        ids.push(id);
    }

    let cancel = cancel_token();
    let (r0, r1, r2) = tokio::join!(
        stages::summarize(&ctx, ids[0], &cancel),
        stages::summarize(&ctx, ids[1], &cancel),
        stages::summarize(&ctx, ids[2], &cancel),
    );

    for outcome in [r0, r1, r2] {
        assert_eq!(outcome, crate::stages::StageOutcome::Advanced);
    }
    assert_eq!(max_observed.load(std::sync::atomic::Ordering::SeqCst), 1);

    for id in ids {
        let document = ctx.documents.get(id).await.unwrap();
        assert_eq!(document.status().unwrap(), DocumentStatus::Summarized);
    }
}
