use crate::stages::{self, StageContext, StageOutcome};
use tokio_util::sync::CancellationToken;

/// Document Flow (§4.E):
///
/// ```text
/// OCR -> Classify -+-> Score-Classification -+
///                  |                         +-> Score-Summary -> File -> completed
///                  +-> Summarize -------------+
/// ```
///
/// Score-Classification and Summarize run concurrently; both must advance
/// before Score-Summary runs. A non-`Advanced` outcome anywhere stops the
/// flow; the document stays at its last successfully-written status.
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) {
    if !advanced(stages::ocr(ctx, document_id, cancel).await) {
        return;
    }
    if !advanced(stages::classify(ctx, document_id, cancel).await) {
        return;
    }

    let (score_outcome, summarize_outcome) = {
        let ctx_a = ctx.clone();
        let ctx_b = ctx.clone();
        let cancel_a = cancel.clone();
        let cancel_b = cancel.clone();
        tokio::join!(
            async move { stages::score_classification(&ctx_a, document_id, &cancel_a).await },
            async move { stages::summarize(&ctx_b, document_id, &cancel_b).await },
        )
    };
    if !advanced(score_outcome) || !advanced(summarize_outcome) {
        return;
    }

    if !advanced(stages::score_summary(ctx, document_id, cancel).await) {
        return;
    }
    let _ = stages::file_stage(ctx, document_id, cancel).await;
}

fn advanced(outcome: StageOutcome) -> bool {
    matches!(outcome, StageOutcome::Advanced)
}
