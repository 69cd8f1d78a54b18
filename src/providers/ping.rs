//! Shared ping round-trip and failure classification

use std::time::{Duration, Instant};

use super::{ChatMessage, CompletionClient, CompletionRequest, Credential, PingResult, PingStatus, ProviderFamily};

const PING_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Respond with exactly 'pong' to any message containing 'ping'.";
const PING_USER_PROMPT: &str = "ping";
const PING_MAX_TOKENS: u32 = 10;
const PREVIEW_CHARS: usize = 50;

/// Recorded when the provider answers without any text
pub const EMPTY_RESPONSE_MARKER: &str = "[empty response]";

/// Classify a ping failure from its error text.
///
/// Best-effort substring heuristic over the lowercased message, checked in
/// priority order. It depends on upstream error wording and is not exhaustive.
pub fn classify_ping_error(message: &str, family: ProviderFamily) -> PingStatus {
    let lowered = message.to_lowercase();

    if lowered.contains("timeout") {
        return PingStatus::Timeout;
    }
    if ["quota", "rate", "429"].iter().any(|needle| lowered.contains(needle)) {
        return PingStatus::QuotaExceeded;
    }
    if lowered.contains("unauthorized") || lowered.contains("401") {
        return PingStatus::InvalidKey;
    }
    if family == ProviderFamily::Gemini && lowered.contains("403") {
        return PingStatus::InvalidKey;
    }

    PingStatus::Failed
}

/// Lowercased, trimmed and shortened reply text
pub fn response_preview(text: Option<&str>) -> String {
    let cleaned = text.map(|t| t.trim().to_lowercase()).unwrap_or_default();
    if cleaned.is_empty() {
        return EMPTY_RESPONSE_MARKER.to_string();
    }
    cleaned.chars().take(PREVIEW_CHARS).collect()
}

/// Seconds rounded to two decimals
pub(crate) fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

/// Send the fixed ping prompt through the completion client and time it
pub(crate) async fn run_ping(
    client: &CompletionClient,
    credential: &Credential,
    model: &str,
    timeout: Duration,
) -> PingResult {
    let Some(api_key) = credential.secret() else {
        return PingResult::not_configured(credential);
    };

    let messages = [
        ChatMessage::system(PING_SYSTEM_PROMPT),
        ChatMessage::user(PING_USER_PROMPT),
    ];
    let request = CompletionRequest {
        model,
        messages: &messages,
        api_key,
        max_tokens: PING_MAX_TOKENS,
        timeout,
    };

    let started = Instant::now();
    let outcome = client.complete(&request).await;
    let elapsed = round_seconds(started.elapsed());

    match outcome {
        Ok(text) => {
            tracing::debug!("Ping {} succeeded in {}s", credential.name(), elapsed);
            PingResult::success(credential, elapsed, response_preview(text.as_deref()))
        }
        Err(err) => {
            let message = err.to_string();
            let status = classify_ping_error(&message, credential.family());
            tracing::warn!("Ping {} failed ({}): {}", credential.name(), status.as_str(), message);
            PingResult::failure(credential, status, elapsed, message)
        }
    }
}
