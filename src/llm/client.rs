use super::{LlmError, LlmRequest};
use crate::config::LlmConfig;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// HTTP client for the single OpenAI-compatible LLM provider this pipeline
/// is configured against. Shared read-only across tasks (§5 "an LLM client
/// is shared read-only across tasks; it must be safe for concurrent use") —
/// `reqwest::Client` is already `Clone + Send + Sync` over a connection pool.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build llm http client");
        Self { http, config }
    }

    /// Sends `request` as the user turn against `system_prompt` and parses
    /// the response body as `Resp` (§6 "invoke(prompt, input) -> JSON text").
    pub async fn invoke<Req, Resp>(&self, system_prompt: &str, request: &Req) -> Result<Resp, LlmError>
    where
        Req: LlmRequest,
        Resp: DeserializeOwned,
    {
        let user_prompt = serde_json::to_string(request).map_err(|e| LlmError::Parse(e.to_string()))?;

        let chat_request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt },
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature as f64),
            response_format: ResponseFormat { r#type: "json_object".to_string() },
        };

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));

        tracing::debug!(%url, model = %self.config.model, "invoking llm");

        let mut builder = self.http.post(&url).json(&chat_request);
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(self.config.timeout_secs)
            } else {
                LlmError::Api(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(LlmError::Api(format!("provider returned {status}: {body}")));
        }

        let chat_response: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| LlmError::Parse("provider returned no message content".to_string()))?;

        serde_json::from_str(content)
            .map_err(|e| LlmError::Parse(format!("{e}: {content}")))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
