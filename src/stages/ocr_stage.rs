use super::{fail_document, StageContext, StageOutcome};
use crate::models::DocumentStatus;
use tokio_util::sync::CancellationToken;

/// OCR (§4.B.1): pending -> ocr_in_progress -> ocr_completed. Gates through
/// `ocr`.
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::Pending, DocumentStatus::OcrInProgress).await {
        Ok(true) => {},
        Ok(false) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Pending).await,
    }

    let permit = match ctx.gate.acquire("ocr", cancel).await {
        Ok(p) => p,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Pending).await,
    };

    let document = match ctx.documents.get(document_id).await {
        Ok(d) => d,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Pending).await,
    };

    let extracted = match ctx.ocr.extract(&document.folder_path).await {
        Ok(r) => r,
        Err(e) => {
            drop(permit);
            return fail_document(ctx, document_id, e.into(), DocumentStatus::Pending).await;
        },
    };
    drop(permit);

    if let Err(e) = ctx.documents.set_extracted_text(document_id, &extracted.full_text).await {
        return fail_document(ctx, document_id, e, DocumentStatus::Pending).await;
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::OcrInProgress, DocumentStatus::OcrCompleted).await {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_document(ctx, document_id, e, DocumentStatus::Pending).await,
    }
}
