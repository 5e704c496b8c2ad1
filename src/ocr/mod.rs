//! OCR provider client (§6 "OCR provider: extract(folder) -> {full_text, confidence}").

use crate::config::OcrConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr request timed out after {0}s")]
    Timeout(u64),
    #[error("ocr api error: {0}")]
    Api(String),
    #[error("ocr returned malformed response: {0}")]
    Parse(String),
}

impl OcrError {
    pub fn classify(&self) -> crate::error::ErrorKind {
        match self {
            OcrError::Timeout(_) | OcrError::Api(_) => crate::error::ErrorKind::Transient,
            OcrError::Parse(_) => crate::error::ErrorKind::Schema,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExtractResult {
    pub full_text: String,
    #[allow(dead_code)]
    pub confidence: f64,
}

/// Idempotent per call (§6); a failed extraction can always be retried
/// without side effects on the provider side.
#[derive(Clone)]
pub struct OcrClient {
    http: Client,
    config: OcrConfig,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build ocr http client");
        Self { http, config }
    }

    pub async fn extract(&self, folder_path: &str) -> Result<ExtractResult, OcrError> {
        let url = format!("{}/extract", self.config.api_base.trim_end_matches('/'));

        tracing::debug!(%url, %folder_path, "invoking ocr provider");

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "folder": folder_path }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrError::Timeout(self.config.timeout_secs)
                } else {
                    OcrError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OcrError::Api(format!("provider returned {status}: {body}")));
        }

        response.json().await.map_err(|e| OcrError::Parse(e.to_string()))
    }
}
