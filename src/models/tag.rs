use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Where a document-tag association came from (§3 Tag relationship).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSource {
    Llm,
    System,
    User,
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagSource::Llm => "llm",
            TagSource::System => "system",
            TagSource::User => "user",
        };
        f.write_str(s)
    }
}

impl FromStr for TagSource {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "llm" => TagSource::Llm,
            "system" => TagSource::System,
            "user" => TagSource::User,
            other => return Err(crate::error::PipelineError::Domain(format!("unknown tag source: {other}"))),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub id: i64,
    pub tag_normalized: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentTagRow {
    pub document_id: i64,
    pub tag_id: i64,
    pub source: String,
}
