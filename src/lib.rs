//! docflow: a self-improving document filing pipeline.
//!
//! Documents move through OCR, classification, summarization, scoring, and
//! filing; summarizer and classifier prompts evolve automatically when a
//! scored replacement outperforms the active version by a wide enough
//! margin. See `DESIGN.md` for the full design.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod error;
pub mod flows;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod prompts;
pub mod series_engine;
pub mod stages;
pub mod store;
pub mod tags;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use stages::StageContext;

use sqlx::SqlitePool;

/// Builds the [`StageContext`] that every stage, flow, and the orchestrator
/// share: one handle per store table, the external provider clients, the
/// two concurrency primitives, and the loaded configuration.
pub fn build_context(pool: SqlitePool, config: Config) -> StageContext {
    let documents = store::DocumentStore::new(pool.clone());
    let files = store::FileStore::new(pool.clone());
    let tags = store::TagStore::new(pool.clone());
    let series_store = store::SeriesStore::new(pool.clone());
    let prompts_store = store::PromptStore::new(pool.clone());
    let locks = store::AdvisoryLockStore::new(pool.clone());

    let llm = llm::LlmClient::new(config.llm.clone());
    let ocr = ocr::OcrClient::new(config.ocr.clone());

    let gate = concurrency::ConcurrencyGate::new(config.concurrency.ocr, config.concurrency.llm, config.concurrency.file_gen);
    let serializer = concurrency::PerTypeSerializer::new(
        locks,
        std::time::Duration::from_secs(config.lock.poll_interval_secs),
        std::time::Duration::from_secs(config.lock.wait_timeout_secs),
        config.lock.stale_after_secs as i64,
    );

    let prompts = prompts::PromptRegistry::new(prompts_store);
    let series = series_engine::SeriesEngine::new(series_store, tags.clone(), files.clone(), llm.clone(), prompts.clone());

    StageContext { documents, files, tags, prompts, series, llm, ocr, gate, serializer, config }
}
