//! Prompt Registry (§4.H): versioned prompts with evolution rules.

use crate::error::PipelineResult;
use crate::models::{PromptRow, PromptType};
use crate::store::PromptStore;

#[derive(Clone)]
pub struct PromptRegistry {
    store: PromptStore,
}

/// Outcome of [`PromptRegistry::maybe_evolve`], reported back to the calling
/// stage so it can decide whether to trigger the file-regeneration cascade.
pub enum EvolutionOutcome {
    Evolved { new_version: PromptRow, triggers_cascade: bool },
    NotEvolved,
}

impl PromptRegistry {
    pub fn new(store: PromptStore) -> Self {
        Self { store }
    }

    pub async fn get_active(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<Option<PromptRow>> {
        self.store.get_active(prompt_type, document_type).await
    }

    pub async fn require_active(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<PromptRow> {
        self.store.require_active(prompt_type, document_type).await
    }

    pub async fn deactivate(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<()> {
        self.store.deactivate(prompt_type, document_type).await
    }

    pub async fn list_versions(&self, prompt_type: PromptType, document_type: Option<&str>) -> PipelineResult<Vec<PromptRow>> {
        self.store.list_versions(prompt_type, document_type).await
    }

    /// The evolution rule, the single source of truth applied identically
    /// inside Score-Classification and Score-Summary (§4.H):
    ///
    /// ```text
    /// if new_score > (active.performance_score ?? 0) + 0.05
    ///    and active.can_evolve
    ///    and (active.score_ceiling is null or new_score < active.score_ceiling):
    ///      deactivate(scope); insert new version; activate it
    /// ```
    pub async fn maybe_evolve(
        &self,
        active: &PromptRow,
        suggested_prompt_text: &str,
        new_score: f64,
        cascade_document_type: &str,
    ) -> PipelineResult<EvolutionOutcome> {
        if !active.should_evolve(new_score) {
            return Ok(EvolutionOutcome::NotEvolved);
        }
        let (new_version, triggers_cascade) =
            self.store.evolve(active, suggested_prompt_text, new_score, cascade_document_type).await?;
        Ok(EvolutionOutcome::Evolved { new_version, triggers_cascade })
    }

    pub async fn seed_initial(
        &self,
        prompt_type: PromptType,
        document_type: Option<&str>,
        prompt_text: &str,
        can_evolve: bool,
        score_ceiling: Option<f64>,
        regenerates_on_update: bool,
    ) -> PipelineResult<i64> {
        self.store
            .seed_initial(prompt_type, document_type, prompt_text, can_evolve, score_ceiling, regenerates_on_update)
            .await
    }
}
