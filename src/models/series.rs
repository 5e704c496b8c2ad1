use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Active,
    Completed,
    Archived,
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeriesStatus::Active => "active",
            SeriesStatus::Completed => "completed",
            SeriesStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

impl FromStr for SeriesStatus {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "active" => SeriesStatus::Active,
            "completed" => SeriesStatus::Completed,
            "archived" => SeriesStatus::Archived,
            other => return Err(crate::error::PipelineError::Domain(format!("unknown series status: {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Llm,
    User,
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordSource::Llm => "llm",
            RecordSource::User => "user",
        };
        f.write_str(s)
    }
}

impl FromStr for RecordSource {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "llm" => RecordSource::Llm,
            "user" => RecordSource::User,
            other => return Err(crate::error::PipelineError::Domain(format!("unknown record source: {other}"))),
        })
    }
}

/// A stable recurring group of documents from one entity (GLOSSARY).
///
/// `owner` realizes the `(entity, series_type, owner)` uniqueness tuple from
/// §3/§6. This crate has no multi-tenant/user model (authentication is a
/// named non-goal), so every series in a single-tenant deployment carries
/// `owner = ""` (SQLite treats distinct NULLs as non-conflicting in a UNIQUE
/// index, so a nullable column can't carry this invariant) and the tuple
/// collapses to `(entity, series_type)` — see DESIGN.md.
#[derive(Debug, Clone, FromRow)]
pub struct SeriesRow {
    pub id: i64,
    pub title: String,
    pub entity: String,
    pub series_type: String,
    pub owner: String,
    pub frequency: String,
    pub description: Option<String>,
    pub metadata: Option<String>,
    pub first_document_date: Option<DateTime<Utc>>,
    pub last_document_date: Option<DateTime<Utc>>,
    pub document_count: i64,
    pub status: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SeriesRow {
    pub fn status(&self) -> Result<SeriesStatus, crate::error::PipelineError> {
        self.status.parse()
    }

    pub fn source(&self) -> Result<RecordSource, crate::error::PipelineError> {
        self.source.parse()
    }

    pub fn metadata_value(&self) -> serde_json::Value {
        self.metadata
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Typed record returned by the series-detector LLM (§4.B.6/§4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDetectResult {
    pub entity: String,
    pub series_type: String,
    pub frequency: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentSeriesRow {
    pub document_id: i64,
    pub series_id: i64,
    pub added_at: DateTime<Utc>,
    pub added_by: String,
}
