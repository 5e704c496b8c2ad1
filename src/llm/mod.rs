//! LLM provider client (§6 "LLM provider: invoke(prompt, input) -> JSON text").
//!
//! An OpenAI-compatible chat/completions client: a single `reqwest::Client`,
//! a system/user message split, and `response_format: json_object` so the
//! provider is asked to return structured JSON directly rather than prose
//! we'd have to scrape.

mod client;

pub use client::LlmClient;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request timed out after {0}s")]
    Timeout(u64),
    #[error("llm provider rate-limited us, retry after {0}s")]
    RateLimited(u64),
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm returned malformed json: {0}")]
    Parse(String),
}

impl LlmError {
    /// Malformed JSON classifies as `Schema` (§7 error kind 2), not
    /// `Transient` — the stage's escalate-after-two-consecutive-occurrences
    /// logic (`record_schema_error_or_fail`) distinguishes it from a flaky
    /// network call, which only escalates at the generic retry ceiling.
    pub fn classify(&self) -> crate::error::ErrorKind {
        match self {
            LlmError::Timeout(_) | LlmError::RateLimited(_) => crate::error::ErrorKind::Transient,
            LlmError::Api(_) => crate::error::ErrorKind::Transient,
            LlmError::Parse(_) => crate::error::ErrorKind::Schema,
        }
    }
}

/// What a stage asks the LLM to do: a system prompt (the active, possibly
/// evolved, prompt text) plus a structured input payload serialized as the
/// user turn.
pub trait LlmRequest: serde::Serialize {
    fn system_prompt(&self) -> &str;
}
