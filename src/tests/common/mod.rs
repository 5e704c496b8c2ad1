//! Shared fixtures for the scenario tests in `src/tests/`: an in-memory
//! State Store plus a wired-up [`StageContext`] pointed at wiremock servers
//! standing in for the LLM/OCR providers.

use crate::config::Config;
use crate::db;
use crate::models::PromptType;
use crate::stages::StageContext;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

/// Builds a [`StageContext`] backed by a fresh in-memory database and
/// pointed at the given mock LLM/OCR base URLs. Lock and retry timings are
/// shortened so scenario tests don't have to wait out production defaults.
pub async fn build_context(llm_base: &str, ocr_base: &str) -> (StageContext, SqlitePool) {
    let pool = db::create_test_pool().await;

    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    config.llm.api_base = llm_base.to_string();
    config.llm.timeout_secs = 5;
    config.ocr.api_base = ocr_base.to_string();
    config.ocr.timeout_secs = 5;
    config.lock.poll_interval_secs = 0;
    config.lock.wait_timeout_secs = 2;
    config.lock.stale_after_secs = 60;
    config.orchestrator.poll_interval_secs = 1;
    config.orchestrator.stuck_threshold_secs = 600;
    config.orchestrator.batch_limit_documents = 50;
    config.orchestrator.batch_limit_files = 20;
    config.retry.max_retries = 3;

    let ctx = crate::build_context(pool.clone(), config);
    (ctx, pool)
}

/// Seeds the four prompt scopes every stage requires an active prompt for.
pub async fn seed_default_prompts(ctx: &StageContext) {
    ctx.prompts
        .seed_initial(PromptType::Classifier, None, "classify this document", true, None, false)
        .await
        .unwrap();
    ctx.prompts
        .seed_initial(PromptType::Summarizer, None, "summarize this document", true, None, false)
        .await
        .unwrap();
    ctx.prompts
        .seed_initial(PromptType::SeriesDetector, None, "detect the recurring series", true, None, false)
        .await
        .unwrap();
    ctx.prompts
        .seed_initial(PromptType::FileSummarizer, None, "summarize these documents together", true, None, false)
        .await
        .unwrap();
}

/// Mounts a `POST /extract` OCR responder returning `full_text` verbatim.
pub async fn mount_ocr(server: &wiremock::MockServer, full_text: &str) {
    use wiremock::matchers::{method, path};
    use wiremock::Mock;

    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "full_text": full_text,
            "confidence": 0.98,
        })))
        .mount(server)
        .await;
}

/// Mounts a `POST /chat/completions` responder that always returns `body`
/// as the assistant message content, regardless of which stage is calling —
/// correct whenever a test drives exactly one kind of LLM call at a time.
pub async fn mount_llm(server: &wiremock::MockServer, body: serde_json::Value) {
    use wiremock::matchers::{method, path};
    use wiremock::Mock;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_envelope(&body)))
        .mount(server)
        .await;
}

/// Same as [`mount_llm`] but fails the test if it's called more or fewer
/// than once — for scenarios asserting a stage does/doesn't call the LLM.
pub async fn mount_llm_once(server: &wiremock::MockServer, body: serde_json::Value) {
    use wiremock::matchers::{method, path};
    use wiremock::Mock;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion_envelope(&body)))
        .expect(1)
        .mount(server)
        .await;
}

fn chat_completion_envelope(content: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 0,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content.to_string() },
            "finish_reason": "stop",
        }],
    })
}

/// Dispatches a canned response by inspecting the user-turn payload each
/// stage sends (every stage's request struct has at least one field no
/// other stage's does), so a single mount can stand in for a whole flow's
/// worth of distinct LLM calls. Scripts are tried in registration order,
/// the first whose `matches` predicate returns `true` wins.
pub struct ScriptedLlmResponder {
    scripts: Mutex<Vec<(Box<dyn Fn(&serde_json::Value) -> bool + Send + Sync>, serde_json::Value)>>,
}

impl ScriptedLlmResponder {
    pub fn new() -> Self {
        Self { scripts: Mutex::new(Vec::new()) }
    }

    pub fn on(
        mut self,
        matches: impl Fn(&serde_json::Value) -> bool + Send + Sync + 'static,
        response: serde_json::Value,
    ) -> Self {
        self.scripts.get_mut().unwrap().push((Box::new(matches), response));
        self
    }

    pub async fn mount(self, server: &wiremock::MockServer) {
        use wiremock::matchers::{method, path};
        use wiremock::Mock;

        Mock::given(method("POST")).and(path("/chat/completions")).respond_with(self).mount(server).await;
    }
}

impl Respond for ScriptedLlmResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let envelope: serde_json::Value = serde_json::from_slice(&request.body).expect("chat request body is json");
        let user_content = envelope["messages"][1]["content"].as_str().unwrap_or("");
        let payload: serde_json::Value = serde_json::from_str(user_content).unwrap_or(serde_json::Value::Null);

        let scripts = self.scripts.lock().unwrap();
        for (matches, response) in scripts.iter() {
            if matches(&payload) {
                return ResponseTemplate::new(200).set_body_json(chat_completion_envelope(response));
            }
        }
        ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": { "message": format!("no script matched request: {payload}"), "code": "unscripted" }
        }))
    }
}

pub fn is_classify_request(v: &serde_json::Value) -> bool {
    v.get("known_document_types").is_some()
}

pub fn is_summarize_request(v: &serde_json::Value) -> bool {
    v.get("classification_reasoning").is_some()
}

pub fn is_series_detect_request(v: &serde_json::Value) -> bool {
    v.get("tags").is_some() && v.get("members").is_none()
}

pub fn is_file_summarize_request(v: &serde_json::Value) -> bool {
    v.get("members").is_some()
}

/// Counts overlapping in-flight calls while holding each response open for
/// `delay` on a blocking sleep — the standard way to simulate a slow
/// downstream call with wiremock's synchronous `Respond` trait. Requires a
/// multi-threaded test runtime so one blocked worker doesn't stall the rest.
pub struct ExclusiveLlmResponder {
    body: serde_json::Value,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    pub max_observed_concurrency: Arc<AtomicUsize>,
}

impl ExclusiveLlmResponder {
    pub fn new(body: serde_json::Value, delay: Duration) -> Self {
        Self { body, delay, in_flight: Arc::new(AtomicUsize::new(0)), max_observed_concurrency: Arc::new(AtomicUsize::new(0)) }
    }

    pub async fn mount(self, server: &wiremock::MockServer) {
        use wiremock::matchers::{method, path};
        use wiremock::Mock;

        Mock::given(method("POST")).and(path("/chat/completions")).respond_with(self).mount(server).await;
    }
}

impl Respond for ExclusiveLlmResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed_concurrency.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json(chat_completion_envelope(&self.body))
    }
}

pub fn cancel_token() -> tokio_util::sync::CancellationToken {
    tokio_util::sync::CancellationToken::new()
}
