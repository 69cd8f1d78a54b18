//! Provider adapters for balance probes and liveness pings

mod traits;
mod completion;
mod deepseek;
mod gemini;
mod ping;

pub use traits::*;
pub use completion::{ChatMessage, CompletionClient, CompletionError, CompletionRequest};
pub use deepseek::DeepSeekProvider;
pub use gemini::GeminiProvider;
pub use ping::{classify_ping_error, response_preview, EMPTY_RESPONSE_MARKER};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_DEEPSEEK_BASE: &str = "https://api.deepseek.com";
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider family identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    #[serde(rename = "deepseek")]
    DeepSeek,
    Gemini,
}

impl ProviderFamily {
    pub fn all() -> Vec<ProviderFamily> {
        vec![ProviderFamily::DeepSeek, ProviderFamily::Gemini]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderFamily::DeepSeek => "deepseek",
            ProviderFamily::Gemini => "gemini",
        }
    }

    pub fn parse(value: &str) -> Option<ProviderFamily> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deepseek" => Some(ProviderFamily::DeepSeek),
            "gemini" => Some(ProviderFamily::Gemini),
            _ => None,
        }
    }

    /// Human-facing label used in the "Type" column
    pub fn label(&self) -> &'static str {
        match self {
            ProviderFamily::DeepSeek => "DeepSeek",
            ProviderFamily::Gemini => "Gemini",
        }
    }

    /// Whether the provider exposes an account balance
    pub fn has_balance(&self) -> bool {
        matches!(self, ProviderFamily::DeepSeek)
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named credential slot. The slot exists even when no secret is configured.
#[derive(Clone)]
pub struct Credential {
    family: ProviderFamily,
    name: String,
    secret: Option<String>,
}

impl Credential {
    pub fn new(family: ProviderFamily, name: impl Into<String>, secret: Option<String>) -> Self {
        let secret = secret
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Self {
            family,
            name: name.into(),
            secret,
        }
    }

    pub fn unconfigured(family: ProviderFamily, name: impl Into<String>) -> Self {
        Self::new(family, name, None)
    }

    pub fn family(&self) -> ProviderFamily {
        self.family
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("family", &self.family)
            .field("name", &self.name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Outcome of one balance or validity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Active,
    Insufficient,
    InvalidKey,
    QuotaExceeded,
    Error,
    NotConfigured,
    Unknown,
}

impl ProbeStatus {
    pub fn all() -> Vec<ProbeStatus> {
        vec![
            ProbeStatus::Active,
            ProbeStatus::Insufficient,
            ProbeStatus::InvalidKey,
            ProbeStatus::QuotaExceeded,
            ProbeStatus::Error,
            ProbeStatus::NotConfigured,
            ProbeStatus::Unknown,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Active => "active",
            ProbeStatus::Insufficient => "insufficient",
            ProbeStatus::InvalidKey => "invalid_key",
            ProbeStatus::QuotaExceeded => "quota_exceeded",
            ProbeStatus::Error => "error",
            ProbeStatus::NotConfigured => "not_configured",
            ProbeStatus::Unknown => "unknown",
        }
    }
}

/// Outcome of one liveness ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingStatus {
    NotTested,
    Success,
    Timeout,
    QuotaExceeded,
    InvalidKey,
    NotConfigured,
    Failed,
}

impl PingStatus {
    pub fn all() -> Vec<PingStatus> {
        vec![
            PingStatus::NotTested,
            PingStatus::Success,
            PingStatus::Timeout,
            PingStatus::QuotaExceeded,
            PingStatus::InvalidKey,
            PingStatus::NotConfigured,
            PingStatus::Failed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PingStatus::NotTested => "not_tested",
            PingStatus::Success => "success",
            PingStatus::Timeout => "timeout",
            PingStatus::QuotaExceeded => "quota_exceeded",
            PingStatus::InvalidKey => "invalid_key",
            PingStatus::NotConfigured => "not_configured",
            PingStatus::Failed => "failed",
        }
    }
}

/// Amounts reported for one currency
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyBalance {
    pub total: f64,
    pub granted: f64,
    pub topped_up: f64,
}

/// DeepSeek account balance, canonical currency lifted to the top level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepSeekBalance {
    pub currency: String,
    pub total: f64,
    pub granted: f64,
    pub topped_up: f64,
    pub balances: BTreeMap<String, CurrencyBalance>,
}

/// Gemini key validity details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiValidity {
    pub models_available: usize,
    pub note: String,
    pub dashboard_url: String,
}

/// Provider-specific probe payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "data", rename_all = "snake_case")]
pub enum ProbeDetails {
    #[serde(rename = "deepseek")]
    DeepSeek(Option<DeepSeekBalance>),
    Gemini(Option<GeminiValidity>),
}

impl ProbeDetails {
    pub fn empty(family: ProviderFamily) -> Self {
        match family {
            ProviderFamily::DeepSeek => ProbeDetails::DeepSeek(None),
            ProviderFamily::Gemini => ProbeDetails::Gemini(None),
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            ProbeDetails::DeepSeek(_) => ProviderFamily::DeepSeek,
            ProbeDetails::Gemini(_) => ProviderFamily::Gemini,
        }
    }
}

/// Raw result of one probe for one credential slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub service: String,
    pub status: ProbeStatus,
    pub details: ProbeDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn not_configured(credential: &Credential) -> Self {
        Self {
            service: credential.name().to_string(),
            status: ProbeStatus::NotConfigured,
            details: ProbeDetails::empty(credential.family()),
            error: Some("API key not found".to_string()),
            checked_at: Utc::now(),
        }
    }

    pub fn error(credential: &Credential, message: impl Into<String>) -> Self {
        Self::failure(credential, ProbeStatus::Error, message)
    }

    pub fn failure(credential: &Credential, status: ProbeStatus, message: impl Into<String>) -> Self {
        Self {
            service: credential.name().to_string(),
            status,
            details: ProbeDetails::empty(credential.family()),
            error: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn family(&self) -> ProviderFamily {
        self.details.family()
    }
}

/// Raw result of one liveness ping for one credential slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub service: String,
    pub family: ProviderFamily,
    pub status: PingStatus,
    pub time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PingResult {
    pub fn not_tested(service: impl Into<String>, family: ProviderFamily) -> Self {
        Self {
            service: service.into(),
            family,
            status: PingStatus::NotTested,
            time_seconds: 0.0,
            response_text: None,
            error: None,
        }
    }

    pub fn not_configured(credential: &Credential) -> Self {
        Self {
            service: credential.name().to_string(),
            family: credential.family(),
            status: PingStatus::NotConfigured,
            time_seconds: 0.0,
            response_text: None,
            error: Some("API key not found".to_string()),
        }
    }

    pub fn success(credential: &Credential, time_seconds: f64, response_text: String) -> Self {
        Self {
            service: credential.name().to_string(),
            family: credential.family(),
            status: PingStatus::Success,
            time_seconds,
            response_text: Some(response_text),
            error: None,
        }
    }

    pub fn failure(
        credential: &Credential,
        status: PingStatus,
        time_seconds: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: credential.name().to_string(),
            family: credential.family(),
            status,
            time_seconds,
            response_text: None,
            error: Some(message.into()),
        }
    }
}

/// Endpoint and timeout settings shared by the real adapters
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub deepseek_base: Url,
    pub gemini_base: Url,
    pub probe_timeout: Duration,
    pub ping_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            deepseek_base: Url::parse(DEFAULT_DEEPSEEK_BASE).expect("valid default DeepSeek URL"),
            gemini_base: Url::parse(DEFAULT_GEMINI_BASE).expect("valid default Gemini URL"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Join a base URL and a relative path without dropping base path segments
pub(crate) fn endpoint_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Adapter failure before it is folded into a result record
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Invalid API key")]
    InvalidKey,
    #[error("Quota exceeded")]
    QuotaExceeded,
    #[error("HTTP {0}")]
    Http(u16),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ProbeError {
    pub fn status(&self) -> ProbeStatus {
        match self {
            ProbeError::InvalidKey => ProbeStatus::InvalidKey,
            ProbeError::QuotaExceeded => ProbeStatus::QuotaExceeded,
            ProbeError::Http(_) | ProbeError::Request(_) | ProbeError::Parse(_) => ProbeStatus::Error,
        }
    }

    /// Request errors without the URL, which may carry a key in its query string
    pub(crate) fn request(err: reqwest::Error) -> Self {
        ProbeError::Request(err.without_url().to_string())
    }
}

/// Adapters registered for one provider family
#[derive(Clone)]
pub struct ProviderAdapters {
    pub balance: Arc<dyn BalanceProbe>,
    pub ping: Arc<dyn PingProbe>,
}

/// Registry mapping provider families to their adapters
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderFamily, ProviderAdapters>,
}

impl ProviderRegistry {
    /// Registry wired to the real DeepSeek and Gemini endpoints
    pub fn new(settings: &ProviderSettings) -> Self {
        let completion = Arc::new(CompletionClient::new(settings));
        let deepseek = Arc::new(DeepSeekProvider::new(settings, completion.clone()));
        let gemini = Arc::new(GeminiProvider::new(settings, completion));

        let mut registry = Self::empty();
        registry.register(ProviderFamily::DeepSeek, deepseek.clone(), deepseek);
        registry.register(ProviderFamily::Gemini, gemini.clone(), gemini);
        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        family: ProviderFamily,
        balance: Arc<dyn BalanceProbe>,
        ping: Arc<dyn PingProbe>,
    ) {
        self.adapters.insert(family, ProviderAdapters { balance, ping });
    }

    pub fn balance_probe(&self, family: ProviderFamily) -> Option<Arc<dyn BalanceProbe>> {
        self.adapters.get(&family).map(|adapters| adapters.balance.clone())
    }

    pub fn ping_probe(&self, family: ProviderFamily) -> Option<Arc<dyn PingProbe>> {
        self.adapters.get(&family).map(|adapters| adapters.ping.clone())
    }
}
