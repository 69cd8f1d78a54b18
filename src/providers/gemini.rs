//! Gemini provider implementation
//!
//! Validity-only provider: Google exposes no balance or usage API for Gemini
//! keys, so the probe lists models and treats a 200 as a live key.
//! Endpoint: https://generativelanguage.googleapis.com/v1beta/models

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use super::ping::run_ping;
use super::{
    endpoint_url, BalanceProbe, CompletionClient, Credential, GeminiValidity, PingProbe,
    PingResult, ProbeDetails, ProbeError, ProbeResult, ProbeStatus, ProviderSettings,
};

const MODELS_PATH: &str = "v1beta/models";
const PING_MODEL: &str = "gemini/gemini-2.0-flash";
const DASHBOARD_URL: &str = "https://console.cloud.google.com/apis/dashboard";
const VALIDITY_NOTE: &str = "Gemini exposes no balance API; only key validity is checked";

pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: Url,
    completion: Arc<CompletionClient>,
    ping_timeout: Duration,
}

impl GeminiProvider {
    pub fn new(settings: &ProviderSettings, completion: Arc<CompletionClient>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.probe_timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: settings.gemini_base.clone(),
            completion,
            ping_timeout: settings.ping_timeout,
        }
    }

    /// List models with the key; returns how many the key can see
    async fn check_validity(&self, api_key: &str) -> Result<usize, ProbeError> {
        let response = self.client
            .get(endpoint_url(&self.base_url, MODELS_PATH))
            .query(&[("key", api_key)])
            .send()
            .await
            .map_err(ProbeError::request)?;

        match response.status().as_u16() {
            200 => {}
            403 => return Err(ProbeError::InvalidKey),
            429 => return Err(ProbeError::QuotaExceeded),
            status => return Err(ProbeError::Http(status)),
        }

        let models: GeminiModelsResponse = response
            .json()
            .await
            .map_err(|e| ProbeError::Parse(format!("models response: {}", e.without_url())))?;

        Ok(models.models.len())
    }
}

#[async_trait]
impl BalanceProbe for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn probe(&self, credential: &Credential) -> ProbeResult {
        let Some(api_key) = credential.secret() else {
            return ProbeResult::not_configured(credential);
        };

        tracing::debug!("Checking Gemini key validity for {}", credential.name());

        match self.check_validity(api_key).await {
            Ok(models_available) => ProbeResult {
                service: credential.name().to_string(),
                status: ProbeStatus::Active,
                details: ProbeDetails::Gemini(Some(GeminiValidity {
                    models_available,
                    note: VALIDITY_NOTE.to_string(),
                    dashboard_url: DASHBOARD_URL.to_string(),
                })),
                error: None,
                checked_at: Utc::now(),
            },
            Err(err) => {
                tracing::warn!("Gemini validity check failed for {}: {}", credential.name(), err);
                ProbeResult::failure(credential, err.status(), err.to_string())
            }
        }
    }
}

#[async_trait]
impl PingProbe for GeminiProvider {
    fn model(&self) -> &str {
        PING_MODEL
    }

    async fn ping(&self, credential: &Credential) -> PingResult {
        run_ping(&self.completion, credential, PING_MODEL, self.ping_timeout).await
    }
}

// ---- API Response Types ----

#[derive(Debug, Deserialize)]
struct GeminiModelsResponse {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}
