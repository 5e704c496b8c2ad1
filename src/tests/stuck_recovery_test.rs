//! S6: a document wedged in a progressing status past the stuck threshold
//! gets reset to its retry predecessor by the orchestrator's sweep, and
//! escalates to `permanently_failed` once it exhausts its retry ceiling
//! (§4.G.1c, §7 error kind 1).

use crate::models::DocumentStatus;
use crate::orchestrator::{Mode, Orchestrator};
use crate::tests::common::*;
use wiremock::MockServer;

async fn backdate(pool: &sqlx::SqlitePool, id: i64) {
    sqlx::query("UPDATE documents SET updated_at = datetime('now', '-15 minutes') WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn stuck_document_resets_then_escalates_after_repeated_timeouts() {
    let llm_server = MockServer::start().await;
    let ocr_server = MockServer::start().await;
    let (ctx, pool) = build_context(&llm_server.uri(), &ocr_server.uri()).await;
    seed_default_prompts(&ctx).await;

    let id = ctx.documents.insert_pending("inbox/stuck", "stuck.jpg", None, None, 3).await.unwrap();
    ctx.documents.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
    backdate(&pool, id).await;

    let orchestrator = Orchestrator::new(ctx.clone());

    orchestrator.run(Mode::RunOnce, cancel_token()).await.unwrap();
    let document = ctx.documents.get(id).await.unwrap();
    assert_eq!(document.status().unwrap(), DocumentStatus::Pending);
    assert_eq!(document.retry_count, 1);

    ctx.documents.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
    backdate(&pool, id).await;
    orchestrator.run(Mode::RunOnce, cancel_token()).await.unwrap();
    let document = ctx.documents.get(id).await.unwrap();
    assert_eq!(document.status().unwrap(), DocumentStatus::Pending);
    assert_eq!(document.retry_count, 2);

    ctx.documents.cas_status(id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await.unwrap();
    backdate(&pool, id).await;
    orchestrator.run(Mode::RunOnce, cancel_token()).await.unwrap();
    let document = ctx.documents.get(id).await.unwrap();
    assert_eq!(document.status().unwrap(), DocumentStatus::PermanentlyFailed);
    assert_eq!(document.retry_count, 3);
    assert!(document.last_error.is_some());
}
