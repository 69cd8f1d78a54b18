//! Unified chat-completion call used by the ping adapters
//!
//! Model identifiers are `<family>/<model>`: `deepseek/...` goes to the
//! OpenAI-compatible DeepSeek endpoint, `gemini/...` to `generateContent`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{endpoint_url, ProviderFamily, ProviderSettings};

const MAX_ERROR_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub api_key: &'a str,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(thiserror::Error, Debug)]
pub enum CompletionError {
    #[error("request timeout after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to parse completion response: {0}")]
    Parse(String),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
}

impl CompletionError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout(timeout)
        } else {
            CompletionError::Transport(err.without_url().to_string())
        }
    }
}

pub struct CompletionClient {
    client: reqwest::Client,
    deepseek_base: Url,
    gemini_base: Url,
}

impl CompletionClient {
    pub fn new(settings: &ProviderSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.ping_timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            deepseek_base: settings.deepseek_base.clone(),
            gemini_base: settings.gemini_base.clone(),
        }
    }

    /// Run one completion. `Ok(None)` means the provider answered without text.
    pub async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Option<String>, CompletionError> {
        let (family, model) = request
            .model
            .split_once('/')
            .and_then(|(prefix, model)| ProviderFamily::parse(prefix).map(|family| (family, model)))
            .ok_or_else(|| CompletionError::UnsupportedModel(request.model.to_string()))?;

        tracing::debug!("Completion request to {} ({})", family, model);

        match family {
            ProviderFamily::DeepSeek => self.complete_deepseek(model, request).await,
            ProviderFamily::Gemini => self.complete_gemini(model, request).await,
        }
    }

    async fn complete_deepseek(
        &self,
        model: &str,
        request: &CompletionRequest<'_>,
    ) -> Result<Option<String>, CompletionError> {
        let body = json!({
            "model": model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "stream": false,
        });

        let response = self.client
            .post(endpoint_url(&self.deepseek_base, "chat/completions"))
            .bearer_auth(request.api_key)
            .header("Accept", "application/json")
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::from_reqwest(e, request.timeout))?;

        let response = ensure_success(response).await?;
        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| match CompletionError::from_reqwest(e, request.timeout) {
                CompletionError::Transport(message) => CompletionError::Parse(message),
                other => other,
            })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }

    async fn complete_gemini(
        &self,
        model: &str,
        request: &CompletionRequest<'_>,
    ) -> Result<Option<String>, CompletionError> {
        let system_text = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": { "maxOutputTokens": request.max_tokens },
        });
        if !system_text.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system_text }] });
        }

        let path = format!("v1beta/models/{}:generateContent", model);
        let response = self.client
            .post(endpoint_url(&self.gemini_base, &path))
            .header("x-goog-api-key", request.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::from_reqwest(e, request.timeout))?;

        let response = ensure_success(response).await?;
        let parsed: GeminiGenerateResponse = response
            .json()
            .await
            .map_err(|e| match CompletionError::from_reqwest(e, request.timeout) {
                CompletionError::Transport(message) => CompletionError::Parse(message),
                other => other,
            })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Http {
        status: status.as_u16(),
        message: error_message(&body, status),
    })
}

/// Pull `error.message` out of an error body, falling back to the reason phrase
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect()
}

// ---- API Response Types ----

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> ProviderSettings {
        let base = Url::parse(&server.uri()).expect("mock url");
        ProviderSettings {
            deepseek_base: base.clone(),
            gemini_base: base,
            ..ProviderSettings::default()
        }
    }

    fn ping_messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("Reply with pong"), ChatMessage::user("ping")]
    }

    fn request<'a>(model: &'a str, messages: &'a [ChatMessage]) -> CompletionRequest<'a> {
        CompletionRequest {
            model,
            messages,
            api_key: "test-key",
            max_tokens: 10,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn deepseek_completion_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "model": "deepseek-chat", "max_tokens": 10 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Pong" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&settings_for(&server));
        let messages = ping_messages();
        let text = client
            .complete(&request("deepseek/deepseek-chat", &messages))
            .await
            .expect("completion");
        assert_eq!(text.as_deref(), Some("Pong"));
    }

    #[tokio::test]
    async fn gemini_completion_moves_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "systemInstruction": { "parts": [{ "text": "Reply with pong" }] },
                "generationConfig": { "maxOutputTokens": 10 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "pong" }], "role": "model" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&settings_for(&server));
        let messages = ping_messages();
        let text = client
            .complete(&request("gemini/gemini-2.0-flash", &messages))
            .await
            .expect("completion");
        assert_eq!(text.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn http_errors_carry_status_and_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Authentication Fails (no such user)" }
            })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&settings_for(&server));
        let messages = ping_messages();
        let err = client
            .complete(&request("deepseek/deepseek-chat", &messages))
            .await
            .expect_err("401 should fail");
        assert_eq!(err.to_string(), "HTTP 401: Authentication Fails (no such user)");
    }

    #[tokio::test]
    async fn empty_choices_yield_no_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&settings_for(&server));
        let messages = ping_messages();
        let text = client
            .complete(&request("deepseek/deepseek-chat", &messages))
            .await
            .expect("completion");
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "choices": [] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = CompletionClient::new(&settings_for(&server));
        let messages = ping_messages();
        let mut req = request("deepseek/deepseek-chat", &messages);
        req.timeout = Duration::from_millis(300);
        let err = client.complete(&req).await.expect_err("should time out");
        assert!(matches!(err, CompletionError::Timeout(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn unknown_model_prefix_is_rejected() {
        let client = CompletionClient::new(&ProviderSettings::default());
        let messages = ping_messages();
        let err = client
            .complete(&request("openai/gpt-4o", &messages))
            .await
            .expect_err("unsupported");
        assert!(matches!(err, CompletionError::UnsupportedModel(_)));
    }
}
