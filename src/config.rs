//! Monitor configuration sourced from the environment
//!
//! Credential slots are fixed: three DeepSeek keys and one Gemini key. A slot
//! without a value stays in the list as `not_configured`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::monitor::DEFAULT_TTL;
use crate::providers::{Credential, ProviderFamily, ProviderSettings};

pub const DEEPSEEK_KEY_VARS: [&str; 3] = ["DEEPSEEK_API_KEY_1", "DEEPSEEK_API_KEY_2", "DEEPSEEK_API_KEY_3"];
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

const CACHE_TTL_VAR: &str = "APIWATCH_CACHE_TTL_SECS";
const PROBE_TIMEOUT_VAR: &str = "APIWATCH_PROBE_TIMEOUT_SECS";
const PING_TIMEOUT_VAR: &str = "APIWATCH_PING_TIMEOUT_SECS";
const LOG_FILE_VAR: &str = "APIWATCH_LOG_FILE";
const DEEPSEEK_BASE_VAR: &str = "DEEPSEEK_API_BASE";
const GEMINI_BASE_VAR: &str = "GEMINI_API_BASE";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub credentials: Vec<Credential>,
    pub cache_ttl: Duration,
    pub providers: ProviderSettings,
    pub log_to_file: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            credentials: default_slots(|_| None),
            cache_ttl: DEFAULT_TTL,
            providers: ProviderSettings::default(),
            log_to_file: false,
        }
    }
}

impl MonitorConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ProviderSettings::default();

        let providers = ProviderSettings {
            deepseek_base: parse_url(&lookup, DEEPSEEK_BASE_VAR, defaults.deepseek_base)?,
            gemini_base: parse_url(&lookup, GEMINI_BASE_VAR, defaults.gemini_base)?,
            probe_timeout: parse_timeout(&lookup, PROBE_TIMEOUT_VAR, defaults.probe_timeout)?,
            ping_timeout: parse_timeout(&lookup, PING_TIMEOUT_VAR, defaults.ping_timeout)?,
        };

        let cache_ttl = match clean_value(lookup(CACHE_TTL_VAR)) {
            Some(raw) => Duration::from_secs(
                raw.parse()
                    .with_context(|| format!("{} must be a whole number of seconds", CACHE_TTL_VAR))?,
            ),
            None => DEFAULT_TTL,
        };

        let log_to_file = clean_value(lookup(LOG_FILE_VAR))
            .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let credentials = default_slots(&lookup);
        let configured = credentials.iter().filter(|c| c.is_configured()).count();
        tracing::debug!("Configured {} of {} credential slots", configured, credentials.len());

        Ok(Self {
            credentials,
            cache_ttl,
            providers,
            log_to_file,
        })
    }
}

/// DeepSeek slots in order, then the Gemini slot
fn default_slots<F>(lookup: F) -> Vec<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    let mut slots: Vec<Credential> = DEEPSEEK_KEY_VARS
        .iter()
        .enumerate()
        .map(|(index, var)| {
            Credential::new(
                ProviderFamily::DeepSeek,
                format!("DeepSeek Key {}", index + 1),
                clean_value(lookup(*var)),
            )
        })
        .collect();

    slots.push(Credential::new(
        ProviderFamily::Gemini,
        "Gemini",
        clean_value(lookup(GEMINI_KEY_VAR)),
    ));
    slots
}

/// Trim whitespace and surrounding quotes; empty becomes `None`
fn clean_value(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let mut value = raw.trim();

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value = value[1..value.len() - 1].trim();
    }

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_timeout<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = clean_value(lookup(key)) else {
        return Ok(default);
    };

    let seconds: u64 = raw
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds", key))?;
    if seconds == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(seconds))
}

fn parse_url<F>(lookup: &F, key: &str, default: Url) -> Result<Url>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = clean_value(lookup(key)) else {
        return Ok(default);
    };

    let url = Url::parse(&raw).with_context(|| format!("{} is not a valid URL", key))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{} must use http or https", key);
    }
    Ok(url)
}
