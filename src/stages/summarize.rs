use super::{fail_document, StageContext, StageOutcome};
use crate::error::PipelineError;
use crate::models::{DocumentStatus, PromptRow, PromptType, SummarizeResult};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct SummarizeRequest {
    extracted_text: String,
    document_type: String,
    classification_reasoning: String,
}

impl crate::llm::LlmRequest for SummarizeRequest {
    fn system_prompt(&self) -> &str {
        ""
    }
}

/// Summarize (§4.B.4): classified -> summarizing -> summarized. Must hold
/// the per-type lock for the document's type (§4.D) for the whole call so a
/// concurrent prompt upgrade can never race a summarize call of the same
/// type. Gates through `llm`.
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    let document = match ctx.documents.get(document_id).await {
        Ok(d) => d,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    };
    let document_type = match &document.document_type {
        Some(t) => t.clone(),
        None => {
            return fail_document(
                ctx,
                document_id,
                PipelineError::Domain("classified document has no document_type".to_string()),
                DocumentStatus::Classified,
            )
            .await;
        },
    };

    let guard = match ctx.serializer.acquire(&document_type, cancel).await {
        Ok(g) => g,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    };

    match ctx.documents.cas_status(document_id, DocumentStatus::Classified, DocumentStatus::Summarizing).await {
        Ok(true) => {},
        Ok(false) => {
            drop(guard);
            return StageOutcome::Skipped;
        },
        Err(e) => {
            drop(guard);
            return fail_document(ctx, document_id, e, DocumentStatus::Classified).await;
        },
    }

    let active_prompt = match active_summarizer_prompt(ctx, &document_type).await {
        Ok(p) => p,
        Err(e) => {
            drop(guard);
            return fail_document(ctx, document_id, e, DocumentStatus::Classified).await;
        },
    };

    let permit = match ctx.gate.acquire("llm", cancel).await {
        Ok(p) => p,
        Err(e) => {
            drop(guard);
            return fail_document(ctx, document_id, e, DocumentStatus::Classified).await;
        },
    };

    let request = SummarizeRequest {
        extracted_text: document.extracted_text.clone().unwrap_or_default(),
        document_type: document_type.clone(),
        classification_reasoning: document.classification_reasoning.clone().unwrap_or_default(),
    };
    let result: Result<SummarizeResult, _> = ctx.llm.invoke(&active_prompt.prompt_text, &request).await;
    drop(permit);

    let summary = match result {
        Ok(s) => s,
        Err(e) => {
            drop(guard);
            return fail_document(ctx, document_id, e.into(), DocumentStatus::Classified).await;
        },
    };

    if let Err(e) = ctx.documents.set_summary(document_id, &summary.summary, &summary.structured_data).await {
        drop(guard);
        return fail_document(ctx, document_id, e, DocumentStatus::Classified).await;
    }

    let outcome = match ctx.documents.cas_status(document_id, DocumentStatus::Summarizing, DocumentStatus::Summarized).await {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    };
    drop(guard);
    outcome
}

/// Falls back to the generic (document_type=None) summarizer prompt when
/// none is scoped to this type yet (§4.B.4).
async fn active_summarizer_prompt(ctx: &StageContext, document_type: &str) -> Result<PromptRow, PipelineError> {
    if let Some(p) = ctx.prompts.get_active(PromptType::Summarizer, Some(document_type)).await? {
        return Ok(p);
    }
    ctx.prompts.require_active(PromptType::Summarizer, None).await
}
