use super::{fail_document, StageContext, StageOutcome};
use crate::models::{ClassificationStageStatus, DocumentStatus, PromptType, ScoreResult};
use crate::prompts::EvolutionOutcome;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Below this many documents of a type, scoring is skipped entirely (§4.B.3).
const MIN_DOCUMENTS_FOR_SCORING: i64 = 5;

#[derive(Serialize)]
struct ScoreClassificationRequest {
    document_type: String,
    confidence: f64,
    reasoning: String,
    extracted_text: String,
}

impl crate::llm::LlmRequest for ScoreClassificationRequest {
    fn system_prompt(&self) -> &str {
        ""
    }
}

/// Score-Classification (§4.B.3): runs from the `classified` branch of the
/// join, tracked in the independently-CAS'd `classification_stage_status`
/// column rather than the main `status` (see `models::document` module
/// docs). Does not gate through `llm` when scoring is skipped.
pub async fn run(ctx: &StageContext, document_id: i64, cancel: &CancellationToken) -> StageOutcome {
    if cancel.is_cancelled() {
        return StageOutcome::Cancelled;
    }

    match ctx
        .documents
        .cas_classification_stage_status(document_id, ClassificationStageStatus::Pending, ClassificationStageStatus::Scoring)
        .await
    {
        Ok(true) => {},
        Ok(false) => return StageOutcome::Skipped,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
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
                crate::error::PipelineError::Domain("classified document has no document_type".to_string()),
                DocumentStatus::Classified,
            )
            .await;
        },
    };

    let total_of_type = match ctx.documents.count_by_document_type(&document_type).await {
        Ok(n) => n,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    };

    if total_of_type < MIN_DOCUMENTS_FOR_SCORING {
        return finish(ctx, document_id).await;
    }

    let active_prompt = match ctx.prompts.require_active(PromptType::Classifier, None).await {
        Ok(p) => p,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    };

    let permit = match ctx.gate.acquire("llm", cancel).await {
        Ok(p) => p,
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    };

    let request = ScoreClassificationRequest {
        document_type: document_type.clone(),
        confidence: document.classification_confidence.unwrap_or_default(),
        reasoning: document.classification_reasoning.clone().unwrap_or_default(),
        extracted_text: document.extracted_text.clone().unwrap_or_default(),
    };
    let result: Result<ScoreResult, _> = ctx.llm.invoke(&active_prompt.prompt_text, &request).await;
    drop(permit);

    let score = match result {
        Ok(r) => r,
        Err(e) => return fail_document(ctx, document_id, e.into(), DocumentStatus::Classified).await,
    };

    match ctx.prompts.maybe_evolve(&active_prompt, &score.suggested_prompt, score.score, &document_type).await {
        Ok(EvolutionOutcome::Evolved { triggers_cascade, .. }) => {
            if triggers_cascade {
                tracing::info!(document_id, document_type = %document_type, "prompt evolved, cascaded file invalidation");
            }
        },
        Ok(EvolutionOutcome::NotEvolved) => {},
        Err(e) => return fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    }

    finish(ctx, document_id).await
}

async fn finish(ctx: &StageContext, document_id: i64) -> StageOutcome {
    match ctx
        .documents
        .cas_classification_stage_status(document_id, ClassificationStageStatus::Scoring, ClassificationStageStatus::Scored)
        .await
    {
        Ok(true) => StageOutcome::Advanced,
        Ok(false) => StageOutcome::Skipped,
        Err(e) => fail_document(ctx, document_id, e, DocumentStatus::Classified).await,
    }
}
