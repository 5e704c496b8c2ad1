//! Stage Task Library (§4.B). Each stage is a function on one document or
//! file id; it mutates the row and returns a [`StageOutcome`] describing
//! what happened, rather than surfacing an error across the flow boundary
//! (§7 "stages never throw across the flow boundary; they translate into
//! status writes").

mod classify;
mod file_stage;
mod file_summarize;
mod ocr_stage;
mod score_classification;
mod score_summary;
mod summarize;

pub use classify::run as classify;
pub use file_stage::run as file_stage;
pub use file_summarize::run as file_summarize;
pub use ocr_stage::run as ocr;
pub use score_classification::run as score_classification;
pub use score_summary::run as score_summary;
pub use summarize::run as summarize;

use crate::concurrency::{ConcurrencyGate, PerTypeSerializer};
use crate::config::Config;
use crate::error::{ErrorKind, PipelineError};
use crate::llm::LlmClient;
use crate::ocr::OcrClient;
use crate::prompts::PromptRegistry;
use crate::series_engine::SeriesEngine;
use crate::store::{DocumentStore, FileStore, TagStore};

/// Handles bundled into every stage call (§4.B "Inputs: id plus handles to
/// State Store, LLM client, OCR client").
#[derive(Clone)]
pub struct StageContext {
    pub documents: DocumentStore,
    pub files: FileStore,
    pub tags: TagStore,
    pub prompts: PromptRegistry,
    pub series: SeriesEngine,
    pub llm: LlmClient,
    pub ocr: OcrClient,
    pub gate: ConcurrencyGate,
    pub serializer: PerTypeSerializer,
    pub config: Config,
}

/// What a stage did. `Skipped` covers the case where a concurrent caller
/// already moved the row off the entry status the CAS expected — a normal
/// race, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Advanced,
    Skipped,
    Retrying,
    PermanentlyFailed,
    Cancelled,
}

/// Shared error-to-status-write translation for document stages (§7).
pub(crate) async fn fail_document(
    ctx: &StageContext,
    document_id: i64,
    err: PipelineError,
    retry_reset: crate::models::DocumentStatus,
) -> StageOutcome {
    match err.classify() {
        ErrorKind::Cancelled => StageOutcome::Cancelled,
        ErrorKind::Domain => {
            if let Err(e) = ctx.documents.mark_permanently_failed(document_id, &err.to_string()).await {
                tracing::error!(document_id, error = %e, "failed to record permanent failure");
            }
            StageOutcome::PermanentlyFailed
        },
        ErrorKind::Schema => {
            match ctx.documents.record_schema_error_or_fail(document_id, retry_reset, &err.to_string()).await {
                Ok(true) => StageOutcome::PermanentlyFailed,
                Ok(false) => StageOutcome::Retrying,
                Err(e) => {
                    tracing::error!(document_id, error = %e, "failed to record schema-error escalation");
                    StageOutcome::Retrying
                },
            }
        },
        ErrorKind::Transient | ErrorKind::LockTimeout => {
            match ctx.documents.record_retry_or_fail(document_id, retry_reset, &err.to_string()).await {
                Ok(true) => StageOutcome::PermanentlyFailed,
                Ok(false) => StageOutcome::Retrying,
                Err(e) => {
                    tracing::error!(document_id, error = %e, "failed to record retry");
                    StageOutcome::Retrying
                },
            }
        },
    }
}

/// Shared error-to-status-write translation for file stages (§7).
pub(crate) async fn fail_file(
    ctx: &StageContext,
    file_id: i64,
    err: PipelineError,
    retry_reset: crate::models::FileStatus,
) -> StageOutcome {
    match err.classify() {
        ErrorKind::Cancelled => StageOutcome::Cancelled,
        ErrorKind::Domain => {
            if let Err(e) = ctx.files.mark_permanently_failed(file_id, &err.to_string()).await {
                tracing::error!(file_id, error = %e, "failed to record permanent failure");
            }
            StageOutcome::PermanentlyFailed
        },
        ErrorKind::Schema => {
            match ctx.files.record_schema_error_or_fail(file_id, retry_reset, &err.to_string()).await {
                Ok(true) => StageOutcome::PermanentlyFailed,
                Ok(false) => StageOutcome::Retrying,
                Err(e) => {
                    tracing::error!(file_id, error = %e, "failed to record schema-error escalation");
                    StageOutcome::Retrying
                },
            }
        },
        ErrorKind::Transient | ErrorKind::LockTimeout => {
            match ctx.files.record_retry_or_fail(file_id, retry_reset, &err.to_string()).await {
                Ok(true) => StageOutcome::PermanentlyFailed,
                Ok(false) => StageOutcome::Retrying,
                Err(e) => {
                    tracing::error!(file_id, error = %e, "failed to record retry");
                    StageOutcome::Retrying
                },
            }
        },
    }
}
