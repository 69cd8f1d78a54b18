//! DeepSeek provider implementation
//!
//! Balance-style provider: one key-scoped balance endpoint per API key.
//! Endpoint: https://api.deepseek.com/user/balance

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use super::ping::run_ping;
use super::{
    endpoint_url, BalanceProbe, CompletionClient, Credential, CurrencyBalance, DeepSeekBalance,
    PingProbe, PingResult, ProbeDetails, ProbeError, ProbeResult, ProbeStatus, ProviderSettings,
};

const BALANCE_PATH: &str = "user/balance";
const CANONICAL_CURRENCY: &str = "USD";
const PING_MODEL: &str = "deepseek/deepseek-chat";

pub struct DeepSeekProvider {
    client: reqwest::Client,
    base_url: Url,
    completion: Arc<CompletionClient>,
    ping_timeout: Duration,
}

impl DeepSeekProvider {
    pub fn new(settings: &ProviderSettings, completion: Arc<CompletionClient>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.probe_timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: settings.deepseek_base.clone(),
            completion,
            ping_timeout: settings.ping_timeout,
        }
    }

    async fn fetch_balance(&self, api_key: &str) -> Result<DeepSeekBalanceResponse, ProbeError> {
        let response = self.client
            .get(endpoint_url(&self.base_url, BALANCE_PATH))
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ProbeError::request)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ProbeError::Http(status));
        }

        response
            .json::<DeepSeekBalanceResponse>()
            .await
            .map_err(|e| ProbeError::Parse(format!("balance response: {}", e.without_url())))
    }

    fn build_result(&self, credential: &Credential, response: DeepSeekBalanceResponse) -> ProbeResult {
        let mut balances = BTreeMap::new();
        let mut canonical = CurrencyBalance::default();

        for info in response.balance_infos {
            let currency = info.currency.unwrap_or_else(|| "Unknown".to_string());
            let entry = CurrencyBalance {
                total: decimal(info.total_balance.as_ref()),
                granted: decimal(info.granted_balance.as_ref()),
                topped_up: decimal(info.topped_up_balance.as_ref()),
            };

            if currency == CANONICAL_CURRENCY {
                canonical = entry;
            }
            balances.insert(currency, entry);
        }

        let status = if response.is_available {
            ProbeStatus::Active
        } else {
            ProbeStatus::Insufficient
        };

        ProbeResult {
            service: credential.name().to_string(),
            status,
            details: ProbeDetails::DeepSeek(Some(DeepSeekBalance {
                currency: CANONICAL_CURRENCY.to_string(),
                total: canonical.total,
                granted: canonical.granted,
                topped_up: canonical.topped_up,
                balances,
            })),
            error: None,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl BalanceProbe for DeepSeekProvider {
    fn name(&self) -> &'static str {
        "DeepSeek"
    }

    async fn probe(&self, credential: &Credential) -> ProbeResult {
        let Some(api_key) = credential.secret() else {
            return ProbeResult::not_configured(credential);
        };

        tracing::debug!("Fetching DeepSeek balance for {}", credential.name());

        match self.fetch_balance(api_key).await {
            Ok(response) => self.build_result(credential, response),
            Err(err) => {
                tracing::warn!("DeepSeek balance check failed for {}: {}", credential.name(), err);
                ProbeResult::failure(credential, err.status(), err.to_string())
            }
        }
    }
}

#[async_trait]
impl PingProbe for DeepSeekProvider {
    fn model(&self) -> &str {
        PING_MODEL
    }

    async fn ping(&self, credential: &Credential) -> PingResult {
        run_ping(&self.completion, credential, PING_MODEL, self.ping_timeout).await
    }
}

/// Parse a decimal that may arrive as a string or a number; anything else is 0
fn decimal(value: Option<&DecimalValue>) -> f64 {
    match value {
        Some(DecimalValue::Number(n)) => *n,
        Some(DecimalValue::Text(s)) => s.trim().parse().unwrap_or(0.0),
        None => 0.0,
    }
}

// ---- API Response Types ----

#[derive(Debug, Deserialize)]
struct DeepSeekBalanceResponse {
    #[serde(default)]
    is_available: bool,
    #[serde(default)]
    balance_infos: Vec<DeepSeekBalanceInfo>,
}

#[derive(Debug, Deserialize)]
struct DeepSeekBalanceInfo {
    currency: Option<String>,
    total_balance: Option<DecimalValue>,
    granted_balance: Option<DecimalValue>,
    topped_up_balance: Option<DecimalValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DecimalValue {
    Number(f64),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{PingStatus, ProviderFamily};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> DeepSeekProvider {
        let base = Url::parse(&server.uri()).expect("mock url");
        let settings = ProviderSettings {
            deepseek_base: base.clone(),
            gemini_base: base,
            ..ProviderSettings::default()
        };
        let completion = Arc::new(CompletionClient::new(&settings));
        DeepSeekProvider::new(&settings, completion)
    }

    fn credential(secret: Option<&str>) -> Credential {
        Credential::new(ProviderFamily::DeepSeek, "DeepSeek Key 1", secret.map(str::to_string))
    }

    #[tokio::test]
    async fn usd_entry_populates_top_level_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/balance"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "is_available": true,
                "balance_infos": [
                    { "currency": "CNY", "total_balance": "70.00", "granted_balance": "0.00", "topped_up_balance": "70.00" },
                    { "currency": "USD", "total_balance": "12.50", "granted_balance": "2.50", "topped_up_balance": "10.00" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider_for(&server).probe(&credential(Some("sk-test"))).await;

        assert_eq!(result.status, ProbeStatus::Active);
        assert!(result.error.is_none());
        let ProbeDetails::DeepSeek(Some(balance)) = result.details else {
            panic!("expected DeepSeek balance details");
        };
        assert_eq!(balance.total, 12.5);
        assert_eq!(balance.granted, 2.5);
        assert_eq!(balance.topped_up, 10.0);
        assert_eq!(balance.balances.len(), 2);
        assert_eq!(balance.balances["CNY"].total, 70.0);
    }

    #[tokio::test]
    async fn unavailable_account_is_insufficient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "is_available": false,
                "balance_infos": [
                    { "currency": "CNY", "total_balance": "0.00", "granted_balance": "0.00", "topped_up_balance": "0.00" }
                ]
            })))
            .mount(&server)
            .await;

        let result = provider_for(&server).probe(&credential(Some("sk-test"))).await;

        assert_eq!(result.status, ProbeStatus::Insufficient);
        let ProbeDetails::DeepSeek(Some(balance)) = result.details else {
            panic!("expected DeepSeek balance details");
        };
        // No USD entry: top-level fields stay at zero.
        assert_eq!(balance.total, 0.0);
        assert!(balance.balances.contains_key("CNY"));
    }

    #[tokio::test]
    async fn non_200_is_error_with_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/balance"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = provider_for(&server).probe(&credential(Some("sk-bad"))).await;

        assert_eq!(result.status, ProbeStatus::Error);
        assert_eq!(result.error.as_deref(), Some("HTTP 401"));
        assert_eq!(result.details, ProbeDetails::DeepSeek(None));
    }

    #[tokio::test]
    async fn malformed_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = provider_for(&server).probe(&credential(Some("sk-test"))).await;

        assert_eq!(result.status, ProbeStatus::Error);
        assert!(result.error.unwrap_or_default().starts_with("Failed to parse response"));
    }

    #[tokio::test]
    async fn empty_secret_never_hits_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let probe = provider.probe(&credential(Some(""))).await;
        let ping = provider.ping(&credential(None)).await;

        assert_eq!(probe.status, ProbeStatus::NotConfigured);
        assert_eq!(ping.status, PingStatus::NotConfigured);
        server.verify().await;
    }

    #[tokio::test]
    async fn ping_lowercases_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": " Pong " } }]
            })))
            .mount(&server)
            .await;

        let result = provider_for(&server).ping(&credential(Some("sk-test"))).await;

        assert_eq!(result.status, PingStatus::Success);
        assert_eq!(result.response_text.as_deref(), Some("pong"));
        assert!(result.error.is_none());
        assert!(result.time_seconds >= 0.0);
    }

    #[tokio::test]
    async fn ping_rate_limit_is_quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Too many requests" }
            })))
            .mount(&server)
            .await;

        let result = provider_for(&server).ping(&credential(Some("sk-test"))).await;

        assert_eq!(result.status, PingStatus::QuotaExceeded);
        assert!(result.response_text.is_none());
        assert_eq!(result.error.as_deref(), Some("HTTP 429: Too many requests"));
    }

    #[test]
    fn decimal_accepts_strings_and_numbers() {
        assert_eq!(decimal(Some(&DecimalValue::Text(" 3.25 ".to_string()))), 3.25);
        assert_eq!(decimal(Some(&DecimalValue::Number(4.0))), 4.0);
        assert_eq!(decimal(Some(&DecimalValue::Text("n/a".to_string()))), 0.0);
        assert_eq!(decimal(None), 0.0);
    }

    #[tokio::test]
    async fn slow_ping_is_classified_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "choices": [{ "message": { "content": "pong" } }] }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).expect("mock url");
        let settings = ProviderSettings {
            deepseek_base: base.clone(),
            gemini_base: base,
            ping_timeout: Duration::from_millis(300),
            ..ProviderSettings::default()
        };
        let provider = DeepSeekProvider::new(&settings, Arc::new(CompletionClient::new(&settings)));

        let result = provider.ping(&credential(Some("sk-test"))).await;

        assert_eq!(result.status, PingStatus::Timeout);
        assert!(result.response_text.is_none());
        assert!(result.error.unwrap_or_default().contains("timeout"));
        assert!(result.time_seconds < 3.0);
    }

    #[test]
    fn adapter_identifies_itself() {
        let settings = ProviderSettings::default();
        let provider = DeepSeekProvider::new(&settings, Arc::new(CompletionClient::new(&settings)));

        assert_eq!(BalanceProbe::name(&provider), "DeepSeek");
        assert_eq!(provider.model(), PING_MODEL);
    }
}
