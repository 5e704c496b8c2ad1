use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Generating,
    Generated,
    Outdated,
    Regenerating,
    PermanentlyFailed,
}

impl FileStatus {
    pub const SWEEP_PROGRESSING: &'static [FileStatus] =
        &[FileStatus::Generating, FileStatus::Regenerating];

    /// Predecessor to reset to after a stuck sweep (§4.G.1c).
    pub fn retry_predecessor(self) -> Option<FileStatus> {
        match self {
            FileStatus::Generating => Some(FileStatus::Pending),
            FileStatus::Regenerating => Some(FileStatus::Outdated),
            _ => None,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Generating => "generating",
            FileStatus::Generated => "generated",
            FileStatus::Outdated => "outdated",
            FileStatus::Regenerating => "regenerating",
            FileStatus::PermanentlyFailed => "permanently_failed",
        };
        f.write_str(s)
    }
}

impl FromStr for FileStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => FileStatus::Pending,
            "generating" => FileStatus::Generating,
            "generated" => FileStatus::Generated,
            "outdated" => FileStatus::Outdated,
            "regenerating" => FileStatus::Regenerating,
            "permanently_failed" => FileStatus::PermanentlyFailed,
            other => return Err(crate::error::PipelineError::Domain(format!("unknown file status: {other}"))),
        })
    }
}

/// A multi-document aggregate keyed by its tag signature (GLOSSARY: "a
/// file's canonical identifier — its tags normalized, sorted, colon-joined").
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: i64,
    /// JSON array of normalized, sorted tags.
    pub tags: String,
    pub tag_signature: String,
    pub source: String,
    pub status: String,
    pub summary_text: Option<String>,
    pub summary_metadata: Option<String>,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    pub last_error_kind: Option<String>,
    pub consecutive_error_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRow {
    pub fn status(&self) -> Result<FileStatus, crate::error::PipelineError> {
        self.status.parse()
    }

    pub fn source(&self) -> Result<super::RecordSource, crate::error::PipelineError> {
        self.source.parse()
    }

    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }
}

/// Builds the canonical tag signature for a file: normalize, sort, dedupe,
/// colon-join (GLOSSARY "Tag signature").
pub fn tag_signature<I: IntoIterator<Item = String>>(tags: I) -> (Vec<String>, String) {
    let mut normalized: Vec<String> = tags.into_iter().map(|t| crate::tags::normalize(&t)).collect();
    normalized.sort();
    normalized.dedup();
    let signature = normalized.join(":");
    (normalized, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_signature_is_sorted_and_deduped() {
        let (tags, sig) = tag_signature(["Bill".to_string(), "bill".to_string(), "Utility".to_string()]);
        assert_eq!(tags, vec!["bill".to_string(), "utility".to_string()]);
        assert_eq!(sig, "bill:utility");
    }
}
