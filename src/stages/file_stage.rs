use super::{fail_document, StageContext, StageOutcome};
use crate::models::DocumentStatus;
use tokio_util::sync::CancellationToken;

/// File (§4.B.6): scored_summary -> filing -> filed. Runs series-detect,
/// finds-or-creates the series and the llm-sourced aggregate file, and
/// associates the document with both.
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::ScoredSummary, DocumentStatus::Filing).await {
        Ok(true) => {},
        Ok(false) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::ScoredSummary).await,
    }

    let document = match ctx.documents.get(document_id).await {
        Ok(d) => d,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::ScoredSummary).await,
    };
    let document_type = document.document_type.clone().unwrap_or_default();
    let summary = document.summary.clone().unwrap_or_default();
    let structured_data = document.structured_data_value();

    let tags = match ctx.tags.tags_for_document(document_id).await {
        Ok(t) => t,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::ScoredSummary).await,
    };

    if let Err(e) = ctx.series.detect_and_file(document_id, &summary, &document_type, &structured_data, &tags).await {
        return fail_document(ctx, document_id, e, DocumentStatus::ScoredSummary).await;
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::Filing, DocumentStatus::Filed).await {
        Ok(true) => {},
        Ok(false) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::ScoredSummary).await,
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::Filed, DocumentStatus::Completed).await {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_document(ctx, document_id, e, DocumentStatus::ScoredSummary).await,
    }
}
