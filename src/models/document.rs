//! Document entity and its status alphabet (§3).
//!
//! The DAG in spec §3 fans out from `classified` into two branches
//! (Score-Classification, Summarize) that must both complete before
//! Score-Summary can run. Two concurrent branches cannot both CAS the same
//! `status` column against the same prior value without one of them losing
//! the race and stalling forever, so the classification branch gets its own
//! small, independently-CAS'd column (`classification_stage_status`)
//! instead of sharing `status`. See DESIGN.md for the full writeup; the
//! monotonicity invariant (§8 property 1) holds for each column
//! independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// The `documents.status` alphabet. `Summarizing`/`Summarized` double as the
/// fanout's "main line" (see module docs); classification scoring progress
/// lives in [`ClassificationStageStatus`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    OcrInProgress,
    OcrCompleted,
    Classifying,
    Classified,
    Summarizing,
    Summarized,
    ScoringSummary,
    ScoredSummary,
    Filing,
    Filed,
    Completed,
    Failed,
    PermanentlyFailed,
}

impl DocumentStatus {
    /// Statuses the orchestrator's stuck-row sweep (§4.G.1c) watches.
    pub const PROGRESSING: &'static [DocumentStatus] = &[
        DocumentStatus::OcrInProgress,
        DocumentStatus::Summarizing,
        DocumentStatus::Filing,
        DocumentStatus::ScoringSummary,
    ];

    /// The status a stuck progressing row resets to for redispatch — the
    /// status that was true immediately before the stage that got stuck.
    pub fn retry_predecessor(self) -> Option<DocumentStatus> {
        match self {
            DocumentStatus::OcrInProgress => Some(DocumentStatus::Pending),
            DocumentStatus::Summarizing => Some(DocumentStatus::Classified),
            DocumentStatus::ScoringSummary => Some(DocumentStatus::Summarized),
            DocumentStatus::Filing => Some(DocumentStatus::ScoredSummary),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::PermanentlyFailed)
    }

    /// The DAG edge relation (§3), asserted on every write (§9 design note).
    pub fn can_advance_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        if next == Failed || next == PermanentlyFailed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, OcrInProgress)
                | (OcrInProgress, OcrCompleted)
                | (OcrCompleted, Classifying)
                | (Classifying, Classified)
                | (Classified, Summarizing)
                | (Summarizing, Summarized)
                | (Summarized, ScoringSummary)
                | (ScoringSummary, ScoredSummary)
                | (ScoredSummary, Filing)
                | (Filing, Filed)
                | (Filed, Completed)
                | (Failed, Pending)
                | (Failed, OcrInProgress)
                | (Failed, Classifying)
                | (Failed, Classified)
                | (Failed, Summarizing)
                | (Failed, Summarized)
                | (Failed, ScoringSummary)
                | (Failed, Filing)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::OcrInProgress => "ocr_in_progress",
            DocumentStatus::OcrCompleted => "ocr_completed",
            DocumentStatus::Classifying => "classifying",
            DocumentStatus::Classified => "classified",
            DocumentStatus::Summarizing => "summarizing",
            DocumentStatus::Summarized => "summarized",
            DocumentStatus::ScoringSummary => "scoring_summary",
            DocumentStatus::ScoredSummary => "scored_summary",
            DocumentStatus::Filing => "filing",
            DocumentStatus::Filed => "filed",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::PermanentlyFailed => "permanently_failed",
        };
        f.write_str(s)
    }
}

impl FromStr for DocumentStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => DocumentStatus::Pending,
            "ocr_in_progress" => DocumentStatus::OcrInProgress,
            "ocr_completed" => DocumentStatus::OcrCompleted,
            "classifying" => DocumentStatus::Classifying,
            "classified" => DocumentStatus::Classified,
            "summarizing" => DocumentStatus::Summarizing,
            "summarized" => DocumentStatus::Summarized,
            "scoring_summary" => DocumentStatus::ScoringSummary,
            "scored_summary" => DocumentStatus::ScoredSummary,
            "filing" => DocumentStatus::Filing,
            "filed" => DocumentStatus::Filed,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            "permanently_failed" => DocumentStatus::PermanentlyFailed,
            other => return Err(crate::error::PipelineError::Domain(format!("unknown document status: {other}"))),
        })
    }
}

/// Progress of the Score-Classification branch, tracked independently of
/// the main `status` column (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStageStatus {
    Pending,
    Scoring,
    Scored,
}

impl ClassificationStageStatus {
    /// The one state the branch's own stuck sweep watches (§4.G.1c); unlike
    /// `DocumentStatus::PROGRESSING` this column only ever has one in-flight
    /// value between its resting states.
    pub const PROGRESSING: &'static [ClassificationStageStatus] = &[ClassificationStageStatus::Scoring];

    pub fn retry_predecessor(self) -> Option<ClassificationStageStatus> {
        match self {
            ClassificationStageStatus::Scoring => Some(ClassificationStageStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for ClassificationStageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationStageStatus::Pending => "pending",
            ClassificationStageStatus::Scoring => "scoring",
            ClassificationStageStatus::Scored => "scored",
        };
        f.write_str(s)
    }
}

impl FromStr for ClassificationStageStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ClassificationStageStatus::Pending,
            "scoring" => ClassificationStageStatus::Scoring,
            "scored" => ClassificationStageStatus::Scored,
            other => {
                return Err(crate::error::PipelineError::Domain(format!(
                    "unknown classification stage status: {other}"
                )));
            },
        })
    }
}

/// Raw row as read from SQLite. `status`/`classification_stage_status` are
/// kept as `String` at the FromRow boundary (sqlx has no native enum support
/// for SQLite) and parsed on access via [`DocumentRow::status`] /
/// [`DocumentRow::classification_stage_status`] — the same manual
/// parse-at-the-boundary pattern used elsewhere in this crate for JSON text
/// columns.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub folder_path: String,
    pub filename: String,
    pub mime: Option<String>,
    pub size_bytes: Option<i64>,
    pub status: String,
    pub extracted_text: Option<String>,
    pub document_type: Option<String>,
    pub classification_confidence: Option<f64>,
    pub classification_reasoning: Option<String>,
    pub classification_stage_status: String,
    pub summary: Option<String>,
    pub structured_data: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    pub last_error_kind: Option<String>,
    pub consecutive_error_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRow {
    pub fn status(&self) -> Result<DocumentStatus, crate::error::PipelineError> {
        self.status.parse()
    }

    pub fn classification_stage_status(&self) -> Result<ClassificationStageStatus, crate::error::PipelineError> {
        self.classification_stage_status.parse()
    }

    pub fn structured_data_value(&self) -> serde_json::Value {
        self.structured_data
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Parsed LLM classify response (§4.B.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_type: String,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Parsed LLM summarize response (§4.B.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeResult {
    pub summary: String,
    #[serde(default)]
    pub structured_data: serde_json::Value,
}

/// Parsed LLM scoring response, shared by Score-Classification and
/// Score-Summary (§4.B.3/4.B.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    pub suggested_prompt: String,
}
