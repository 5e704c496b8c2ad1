//! Pipeline error taxonomy (§7).
//!
//! Every store/stage/flow function in this crate returns [`PipelineError`].
//! It is classified along the Transient/Schema/Domain/Cancelled/LockTimeout
//! axis via [`PipelineError::classify`], which the Stage Task Library
//! consults to decide whether to retry, escalate, or leave a row untouched.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("llm error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("ocr error: {0}")]
    Ocr(#[from] crate::ocr::OcrError),

    #[error("malformed response from {source}: {detail}")]
    Schema { source: &'static str, detail: String },

    #[error("{0}")]
    Domain(String),

    #[error("advisory lock wait timed out for {0:?}")]
    LockTimeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {document_id} is {from:?}, cannot advance via {attempted}")]
    IllegalTransition { document_id: i64, from: String, attempted: &'static str },
}

/// The four error kinds from §7, minus `Cancelled` (modeled as a first-class
/// variant above since stages need to distinguish it from every other kind
/// without incrementing `retry_count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Schema,
    Domain,
    Cancelled,
    LockTimeout,
}

impl PipelineError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            PipelineError::Database(e) => {
                if is_transient_sqlx(e) { ErrorKind::Transient } else { ErrorKind::Domain }
            },
            PipelineError::Llm(e) => e.classify(),
            PipelineError::Ocr(e) => e.classify(),
            PipelineError::Schema { .. } => ErrorKind::Schema,
            PipelineError::Domain(_) => ErrorKind::Domain,
            PipelineError::LockTimeout(_) => ErrorKind::LockTimeout,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::NotFound(_) => ErrorKind::Domain,
            PipelineError::IllegalTransition { .. } => ErrorKind::Domain,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.classify(), ErrorKind::Transient | ErrorKind::LockTimeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.classify(), ErrorKind::Cancelled)
    }
}

fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed
    )
}

pub type PipelineResult<T> = Result<T, PipelineError>;
