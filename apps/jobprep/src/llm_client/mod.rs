//! LLM Client: the single point of entry for all model calls.
//!
//! No other module talks to OpenRouter or Ollama directly; filtering, resume
//! customization and email polish all go through `LlmClient`.
//!
//! Backend is chosen once from config: OpenRouter (OpenAI-compatible chat
//! completions) or a local Ollama server.
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

pub mod prompts;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("No LLM backend configured")]
    NotConfigured,
}

#[derive(Debug, Clone)]
enum Backend {
    OpenRouter { base_url: String, api_key: String },
    Ollama { base_url: String },
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

/// Backend-neutral completion.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// The completion text, if the model produced any.
    pub fn text(&self) -> Option<&str> {
        let text = self.content.trim();
        (!text.is_empty()).then_some(text)
    }
}

/// The single LLM client used by all services.
/// Wraps the configured chat backend with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    backend: Backend,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_base: Duration,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend = if config.use_local {
            Backend::Ollama {
                base_url: config.ollama_base_url.trim_end_matches('/').to_string(),
            }
        } else {
            let api_key = config
                .openrouter_api_key
                .clone()
                .ok_or(LlmError::NotConfigured)?;
            Backend::OpenRouter {
                base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
                api_key,
            }
        };

        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            backend,
            model: config.active_model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry_base: Duration::from_secs(1),
        })
    }

    /// Shortens the backoff between retries.
    #[cfg(test)]
    pub(crate) fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::OpenRouter { .. } => "openrouter",
            Backend::Ollama { .. } => "ollama",
        }
    }

    /// Makes a raw call to the configured backend.
    /// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let messages = || {
            vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ]
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = self.retry_base * (1 << (attempt - 1));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let request = match &self.backend {
                Backend::OpenRouter { base_url, api_key } => self
                    .client
                    .post(format!("{base_url}/chat/completions"))
                    .bearer_auth(api_key)
                    .header("X-Title", "jobprep")
                    .json(&OpenRouterRequest {
                        model: &self.model,
                        messages: messages(),
                        temperature: self.temperature,
                        max_tokens: self.max_tokens,
                    }),
                Backend::Ollama { base_url } => self
                    .client
                    .post(format!("{base_url}/api/chat"))
                    .json(&OllamaRequest {
                        model: &self.model,
                        messages: messages(),
                        stream: false,
                        options: OllamaOptions {
                            temperature: self.temperature,
                            num_predict: self.max_tokens,
                        },
                    }),
            };

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: error_message(&body),
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: error_message(&body),
                });
            }

            let llm_response = match self.backend {
                Backend::OpenRouter { .. } => {
                    let body: OpenRouterResponse = response.json().await?;
                    let usage = body.usage.unwrap_or(OpenRouterUsage {
                        prompt_tokens: 0,
                        completion_tokens: 0,
                    });
                    LlmResponse {
                        content: body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message.content)
                            .unwrap_or_default(),
                        model: body.model.unwrap_or_else(|| self.model.clone()),
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                    }
                }
                Backend::Ollama { .. } => {
                    let body: OllamaResponse = response.json().await?;
                    LlmResponse {
                        content: body.message.and_then(|m| m.content).unwrap_or_default(),
                        model: body.model.unwrap_or_else(|| self.model.clone()),
                        input_tokens: body.prompt_eval_count,
                        output_tokens: body.eval_count,
                    }
                }
            };

            debug!(
                "LLM call succeeded: model={}, input_tokens={}, output_tokens={}",
                llm_response.model, llm_response.input_tokens, llm_response.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the LLM and returns the trimmed text, failing on an empty completion.
    pub async fn call_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }

    /// Convenience method that calls the LLM and deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.call_text(prompt, system).await?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(&text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Cheap round trip used by `jobprep check`.
    pub async fn ping(&self) -> Result<String, LlmError> {
        self.call_text("Reply with the single word: OK", "You are a connectivity check.")
            .await
    }
}

/// Pulls a readable message out of an error body from either backend.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value["error"]["message"]
            .as_str()
            .or_else(|| value["error"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_stub, test_config};
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn openrouter_config(base_url: &str) -> LlmConfig {
        test_config(&[
            ("USE_LOCAL_LLM", "false"),
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("OPENROUTER_BASE_URL", base_url),
        ])
        .llm
    }

    fn completion(content: &str) -> Value {
        json!({
            "model": "anthropic/claude-3.5-sonnet",
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        })
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(error_message("plain"), "plain");
    }

    #[test]
    fn test_openrouter_requires_key() {
        let config = test_config(&[("USE_LOCAL_LLM", "false")]).llm;
        assert!(matches!(
            LlmClient::from_config(&config),
            Err(LlmError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_openrouter_call_json() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "score this");
                Json(completion("```json\n{\"score\": 7}\n```"))
            }),
        );
        let base = spawn_stub(router).await;
        let client = LlmClient::from_config(&openrouter_config(&base)).unwrap();
        assert_eq!(client.backend_name(), "openrouter");

        #[derive(Deserialize)]
        struct Score {
            score: u32,
        }
        let parsed: Score = client.call_json("score this", "json only").await.unwrap();
        assert_eq!(parsed.score, 7);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/chat/completions",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": {"message": "busy"}})))
                    } else {
                        (StatusCode::OK, Json(completion("fine")))
                    }
                }),
            )
            .with_state(hits.clone());
        let base = spawn_stub(router).await;
        let client = LlmClient::from_config(&openrouter_config(&base))
            .unwrap()
            .with_retry_base(Duration::from_millis(5));

        let response = client.call("hi", "sys").await.unwrap();
        assert_eq!(response.text(), Some("fine"));
        assert_eq!(response.input_tokens, 12);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/chat/completions",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "bad key"}})))
                }),
            )
            .with_state(hits.clone());
        let base = spawn_stub(router).await;
        let client = LlmClient::from_config(&openrouter_config(&base)).unwrap();

        match client.call("hi", "sys").await {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ollama_backend() {
        let router = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                assert_eq!(body["model"], "qwen2.5:32b");
                Json(json!({
                    "model": "qwen2.5:32b",
                    "message": { "role": "assistant", "content": "  hello  " },
                    "prompt_eval_count": 5,
                    "eval_count": 1
                }))
            }),
        );
        let base = spawn_stub(router).await;
        let config = test_config(&[("OLLAMA_BASE_URL", base.as_str())]).llm;
        let client = LlmClient::from_config(&config).unwrap();
        assert_eq!(client.backend_name(), "ollama");
        assert_eq!(client.call_text("hi", "sys").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_empty_completion() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(completion("   ")) }),
        );
        let base = spawn_stub(router).await;
        let client = LlmClient::from_config(&openrouter_config(&base)).unwrap();
        assert!(matches!(
            client.call_text("hi", "sys").await,
            Err(LlmError::EmptyContent)
        ));
    }
}
