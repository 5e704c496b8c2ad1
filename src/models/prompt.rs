use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Which stage a prompt version feeds (§3 Prompt, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Classifier,
    Summarizer,
    SeriesDetector,
    FileSummarizer,
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PromptType::Classifier => "classifier",
            PromptType::Summarizer => "summarizer",
            PromptType::SeriesDetector => "series_detector",
            PromptType::FileSummarizer => "file_summarizer",
        };
        f.write_str(s)
    }
}

impl FromStr for PromptType {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "classifier" => PromptType::Classifier,
            "summarizer" => PromptType::Summarizer,
            "series_detector" => PromptType::SeriesDetector,
            "file_summarizer" => PromptType::FileSummarizer,
            other => return Err(crate::error::PipelineError::Domain(format!("unknown prompt type: {other}"))),
        })
    }
}

/// A versioned prompt (§3 Prompt, §4.H Prompt evolution).
///
/// `document_type` is `None` for prompt types that aren't scoped to a
/// document type: the classifier (it runs before a document type is known)
/// and the series detector / file summarizer (they operate across types).
/// It is `Some(_)` for the summarizer, which is versioned per document type
/// once Classify has already assigned one.
#[derive(Debug, Clone, FromRow)]
pub struct PromptRow {
    pub id: i64,
    pub prompt_type: String,
    pub document_type: Option<String>,
    pub version: i64,
    pub prompt_text: String,
    pub performance_score: Option<f64>,
    pub can_evolve: bool,
    pub score_ceiling: Option<f64>,
    pub regenerates_on_update: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromptRow {
    pub fn prompt_type(&self) -> Result<PromptType, crate::error::PipelineError> {
        self.prompt_type.parse()
    }

    /// Evolution admission rule (§4.H): a candidate score must clear the
    /// active prompt's score by more than a fixed margin, the active prompt
    /// must allow evolution, and an optional ceiling must not be exceeded.
    pub fn should_evolve(&self, candidate_score: f64) -> bool {
        const IMPROVEMENT_MARGIN: f64 = 0.05;
        if !self.can_evolve {
            return false;
        }
        let baseline = self.performance_score.unwrap_or(0.0);
        if candidate_score <= baseline + IMPROVEMENT_MARGIN {
            return false;
        }
        match self.score_ceiling {
            Some(ceiling) => candidate_score < ceiling,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(performance_score: Option<f64>, can_evolve: bool, score_ceiling: Option<f64>) -> PromptRow {
        let now = Utc::now();
        PromptRow {
            id: 1,
            prompt_type: "classifier".to_string(),
            document_type: Some("invoice".to_string()),
            version: 1,
            prompt_text: "classify this document".to_string(),
            performance_score,
            can_evolve,
            score_ceiling,
            regenerates_on_update: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn evolves_only_past_the_improvement_margin() {
        let p = row(Some(0.80), true, None);
        assert!(!p.should_evolve(0.83));
        assert!(p.should_evolve(0.86));
    }

    #[test]
    fn respects_can_evolve_flag() {
        let p = row(Some(0.5), false, None);
        assert!(!p.should_evolve(0.99));
    }

    #[test]
    fn respects_score_ceiling() {
        let p = row(Some(0.80), true, Some(0.90));
        assert!(!p.should_evolve(0.95));
        assert!(p.should_evolve(0.89));
    }
}
