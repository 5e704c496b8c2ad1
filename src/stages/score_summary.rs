use super::{fail_document, StageContext, StageOutcome};
use crate::models::{ClassificationStageStatus, DocumentStatus, PromptType, ScoreResult};
use crate::prompts::EvolutionOutcome;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

const MIN_DOCUMENTS_FOR_SCORING: i64 = 5;

#[derive(Serialize)]
struct ScoreSummaryRequest {
    document_type: String,
    summary: String,
    structured_data: serde_json::Value,
}

impl crate::llm::LlmRequest for ScoreSummaryRequest {
    fn system_prompt(&self) -> &str {
        ""
    }
}

/// Score-Summary (§4.B.5): entry criterion is the join of both upstream
/// branches — `status == summarized` *and* `classification_stage_status ==
/// scored` (see `models::document` module docs for why the branch is
/// tracked in its own column). Mirrors Score-Classification for summarizer
/// prompts scoped to the document's type; an evolution with
/// `regenerates_on_update=true` cascades into file invalidation (§4.H).
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    let document = match ctx.documents.get(document_id).await {
        Ok(d) => d,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    };

    match document.classification_stage_status() {
        Ok(ClassificationStageStatus::Scored) => {},
        Ok(_) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    }

    let document_type = match &document.document_type {
        Some(t) => t.clone(),
        None => {
            return fail_document(
                ctx,
                document_id,
                crate::error::PipelineError::Domain("document has no document_type at score-summary".to_string()),
                DocumentStatus::Summarized,
            )
            .await;
        },
    };

    match ctx.documents.cas_status(document_id, DocumentStatus::Summarized, DocumentStatus::ScoringSummary).await {
        Ok(true) => {},
        Ok(false) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    }

    let total_of_type = match ctx.documents.count_by_document_type(&document_type).await {
        Ok(n) => n,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    };

    if total_of_type < MIN_DOCUMENTS_FOR_SCORING {
        return finish(ctx, document_id).await;
    }

    let active_prompt = match ctx.prompts.get_active(PromptType::Summarizer, Some(document_type.as_str())).await {
        Ok(Some(p)) => p,
        Ok(None) => match ctx.prompts.require_active(PromptType::Summarizer, None).await {
            Ok(p) => p,
            Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
        },
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    };

    let permit = match ctx.gate.acquire("llm", cancel).await {
        Ok(p) => p,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    };

    let request = ScoreSummaryRequest {
        document_type: document_type.clone(),
        summary: document.summary.clone().unwrap_or_default(),
        structured_data: document.structured_data_value(),
    };
    let result: Result<ScoreResult, _> = ctx.llm.invoke(&active_prompt.prompt_text, &request).await;
    drop(permit);

    let score = match result {
        Ok(r) => r,
        Err(e) => return fail_document(ctx, document_id, e.into(), DocumentStatus::Summarized).await,
    };

    match ctx.prompts.maybe_evolve(&active_prompt, &score.suggested_prompt, score.score, &document_type).await {
        Ok(EvolutionOutcome::Evolved { triggers_cascade, .. }) => {
            if triggers_cascade {
                tracing::info!(document_id, document_type = %document_type, "prompt evolved, cascaded file invalidation");
            }
        },
        Ok(EvolutionOutcome::NotEvolved) => {},
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    }

    finish(ctx, document_id).await
}

async fn finish(ctx: &StageContext, document_id: i64) -> StageOutcome {
    match ctx.documents.cas_status(document_id, DocumentStatus::ScoringSummary, DocumentStatus::ScoredSummary).await {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_document(ctx, document_id, e, DocumentStatus::Summarized).await,
    }
}
