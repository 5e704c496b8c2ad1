//! Series Engine (§4.I): detect + invalidate.

use crate::error::PipelineResult;
use crate::llm::LlmClient;
use crate::models::{PromptType, RecordSource, SeriesDetectResult, SeriesRow, TagSource};
use crate::prompts::PromptRegistry;
use crate::store::{FileStore, SeriesStore, TagStore};
use crate::tags;
use serde::Serialize;

#[derive(Clone)]
pub struct SeriesEngine {
    series_store: SeriesStore,
    tag_store: TagStore,
    file_store: FileStore,
    llm: LlmClient,
    prompts: PromptRegistry,
}

#[derive(Serialize)]
struct SeriesDetectRequest {
    summary: String,
    document_type: String,
    structured_data: serde_json::Value,
    tags: Vec<String>,
}

impl crate::llm::LlmRequest for SeriesDetectRequest {
    fn system_prompt(&self) -> &str {
        ""
    }
}

impl SeriesEngine {
    pub fn new(series_store: SeriesStore, tag_store: TagStore, file_store: FileStore, llm: LlmClient, prompts: PromptRegistry) -> Self {
        Self { series_store, tag_store, file_store, llm, prompts }
    }

    /// Calls the series detector LLM, finds-or-creates the matching series,
    /// associates the document, stamps the `series:<slug>` tag, and
    /// finds-or-creates the llm-sourced aggregate file for that tag (§4.B.6).
    /// Returns the file id the document now belongs to.
    pub async fn detect_and_file(
        &self,
        document_id: i64,
        summary: &str,
        document_type: &str,
        structured_data: &serde_json::Value,
        document_tags: &[String],
    ) -> PipelineResult<i64> {
        let active_prompt = self.prompts.require_active(PromptType::SeriesDetector, None).await?;

        let request = SeriesDetectRequest {
            summary: summary.to_string(),
            document_type: document_type.to_string(),
            structured_data: structured_data.clone(),
            tags: document_tags.to_vec(),
        };
        let detected: SeriesDetectResult = self.llm.invoke(&active_prompt.prompt_text, &request).await?;

        let series = self.find_or_create_series(&detected).await?;
        self.series_store.associate_document(document_id, series.id, RecordSource::Llm).await?;

        let series_tag = tags::series_tag(&detected.entity);
        self.tag_store.tag_document(document_id, &series_tag, TagSource::System).await?;

        let file = self.file_store.find_or_create_llm_file(&[series_tag.clone()], &series_tag).await?;
        self.file_store.associate_document(document_id, file.id).await?;

        Ok(file.id)
    }

    async fn find_or_create_series(&self, detected: &SeriesDetectResult) -> PipelineResult<SeriesRow> {
        self.series_store.find_or_create(detected).await
    }

    /// Per-document invalidation (§4.I.2): re-checks `document_id`'s current
    /// tag set against every file it already belongs to. A file's
    /// `tag_signature` is the tag set it was built from; once the document
    /// no longer carries every one of those tags, the aggregate it
    /// contributed to no longer reflects what this document would file into
    /// today, so the file flips to `outdated`. Distinct from the
    /// document-type-wide `regenerates_on_update` cascade (§4.H, folded into
    /// `PromptStore::evolve`) — this only ever touches files the one
    /// document is a member of. Triggered from tag-change call sites (e.g.
    /// after `Classify` retags a reprocessed document).
    pub async fn invalidate_mismatched_files_for_document(&self, document_id: i64) -> PipelineResult<u64> {
        let current_tags = self.tag_store.tags_for_document(document_id).await?;
        let current: std::collections::HashSet<&str> = current_tags.iter().map(String::as_str).collect();

        let mut invalidated = 0;
        for file_id in self.file_store.file_ids_for_document(document_id).await? {
            let file = self.file_store.get(file_id).await?;
            let still_matches = file.tags_vec().iter().all(|tag| current.contains(tag.as_str()));
            if !still_matches && self.file_store.mark_outdated_if_eligible(file_id).await? {
                invalidated += 1;
            }
        }
        Ok(invalidated)
    }
}
