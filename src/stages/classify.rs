use super::{fail_document, StageContext, StageOutcome};
use crate::models::{ClassificationResult, DocumentStatus, PromptType, TagSource};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// How many popular tags are surfaced to the classifier as candidates.
const POPULAR_TAG_SUGGESTIONS: i64 = 20;

#[derive(Serialize)]
struct ClassifyRequest {
    extracted_text: String,
    known_document_types: Vec<String>,
    popular_tags: Vec<String>,
}

impl crate::llm::LlmRequest for ClassifyRequest {
    fn system_prompt(&self) -> &str {
        ""
    }
}

/// Classify (§4.B.2): ocr_completed -> classified. Gates through `llm`.
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::OcrCompleted, DocumentStatus::Classifying).await {
        Ok(true) => {},
        Ok(false) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    }

    let document = match ctx.documents.get(document_id).await {
        Ok(d) => d,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    };
    let extracted_text = document.extracted_text.unwrap_or_default();

    let known_document_types = match ctx.documents.known_document_types().await {
        Ok(t) => t,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    };
    let popular_tags = match ctx.tags.top_popular_tags(POPULAR_TAG_SUGGESTIONS).await {
        Ok(t) => t,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    };

    let active_prompt = match ctx.prompts.require_active(PromptType::Classifier, None).await {
        Ok(p) => p,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    };

    let permit = match ctx.gate.acquire("llm", cancel).await {
        Ok(p) => p,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    };

    let request = ClassifyRequest { extracted_text, known_document_types, popular_tags };
    let result: Result<ClassificationResult, _> = ctx.llm.invoke(&active_prompt.prompt_text, &request).await;
    drop(permit);

    let classification = match result {
        Ok(c) => c,
        Err(e) => return fail_document(ctx, document_id, e.into(), DocumentStatus::OcrCompleted).await,
    };

    if let Err(e) = ctx
        .documents
        .set_classification(document_id, &classification.document_type, classification.confidence, &classification.reasoning)
        .await
    {
        return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await;
    }

    if let Err(e) = ctx.tags.tag_document(document_id, &classification.document_type, TagSource::System).await {
        return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await;
    }
    for tag in &classification.tags {
        if let Err(e) = ctx.tags.tag_document(document_id, tag, TagSource::Llm).await {
            return fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await;
        }
    }

    // Reprocessing a document can change its tag set; re-check any file it
    // already belongs to against that new set (§4.I.2).
    if let Err(e) = ctx.series.invalidate_mismatched_files_for_document(document_id).await {
        tracing::warn!(document_id, error = %e, "failed to re-evaluate file membership after tag change");
    }

    match ctx.documents.cas_status(document_id, DocumentStatus::Classifying, DocumentStatus::Classified).await {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_document(ctx, document_id, e, DocumentStatus::OcrCompleted).await,
    }
}
