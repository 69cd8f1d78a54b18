//! Display formatting for probe and ping results
//!
//! The status and ping mappings live here once and are reused both when a
//! record is first built and when a later ping round is merged into it.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Local;
use serde::Serialize;

use crate::providers::{
    CurrencyBalance, PingResult, PingStatus, ProbeDetails, ProbeResult, ProbeStatus, ProviderFamily,
};

const SLOW_PING_SECONDS: f64 = 3.0;
const MISSING: &str = "-";

/// Human-facing fields; every value is a display string
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub service: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub total_balance: String,
    pub granted: String,
    pub topped_up: String,
    pub ping_test: String,
    pub last_check: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Raw values used for sorting, statistics and re-formatting
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInternals {
    pub family: ProviderFamily,
    pub status: ProbeStatus,
    pub balance_value: f64,
    pub balances: BTreeMap<String, CurrencyBalance>,
    pub ping_status: PingStatus,
    pub ping_time: f64,
    pub ping_response: Option<String>,
    pub ping_error: Option<String>,
    pub models_available: Option<usize>,
    pub note: Option<String>,
    pub dashboard_url: Option<String>,
}

/// One row of the balance view. Only the display region is serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRecord {
    #[serde(flatten)]
    pub display: DisplayRecord,
    #[serde(skip)]
    pub internals: RecordInternals,
}

impl AggregatedRecord {
    pub fn service(&self) -> &str {
        &self.display.service
    }

    pub fn family(&self) -> ProviderFamily {
        self.internals.family
    }

    pub fn status(&self) -> ProbeStatus {
        self.internals.status
    }

    /// Replace the ping fields and recompute the ping display string
    pub fn apply_ping(&mut self, ping: &PingResult) {
        self.internals.ping_status = ping.status;
        self.internals.ping_time = ping.time_seconds;
        self.internals.ping_response = ping.response_text.clone();
        self.internals.ping_error = ping.error.clone();
        self.display.ping_test = ping_display(ping.status, ping.time_seconds);
    }
}

pub fn status_emoji(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Active => "🟢",
        ProbeStatus::Insufficient | ProbeStatus::QuotaExceeded => "🟡",
        ProbeStatus::Error | ProbeStatus::InvalidKey => "🔴",
        ProbeStatus::NotConfigured | ProbeStatus::Unknown => "⚫",
    }
}

/// `"{emoji} {Title Case}"`, e.g. `"⚫ Not Configured"`
pub fn status_display(status: ProbeStatus) -> String {
    format!("{} {}", status_emoji(status), title_case(status.as_str()))
}

pub fn ping_display(status: PingStatus, time_seconds: f64) -> String {
    match status {
        PingStatus::NotTested => "⚪ Not tested".to_string(),
        PingStatus::Success if time_seconds < SLOW_PING_SECONDS => format!("🟢 {:.2}s", time_seconds),
        PingStatus::Success => format!("🟡 {:.2}s (slow)", time_seconds),
        PingStatus::Timeout => "🔴 Timeout".to_string(),
        PingStatus::QuotaExceeded => "🟡 Quota exceeded".to_string(),
        PingStatus::InvalidKey => "🔴 Invalid key".to_string(),
        PingStatus::NotConfigured => "⚫ Not configured".to_string(),
        PingStatus::Failed => "🔴 Failed".to_string(),
    }
}

fn title_case(value: &str) -> String {
    value
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_usd(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Build the display record for one slot from its probe and ping results
pub fn format_record(probe: &ProbeResult, ping: &PingResult) -> AggregatedRecord {
    let family = probe.family();
    let mut display = DisplayRecord {
        service: probe.service.clone(),
        kind: family.label().to_string(),
        status: status_display(probe.status),
        total_balance: MISSING.to_string(),
        granted: MISSING.to_string(),
        topped_up: MISSING.to_string(),
        ping_test: String::new(),
        last_check: probe.checked_at.with_timezone(&Local).format("%H:%M:%S").to_string(),
        error: probe.error.clone(),
    };
    let mut internals = RecordInternals {
        family,
        status: probe.status,
        balance_value: 0.0,
        balances: BTreeMap::new(),
        ping_status: PingStatus::NotTested,
        ping_time: 0.0,
        ping_response: None,
        ping_error: None,
        models_available: None,
        note: None,
        dashboard_url: None,
    };

    match &probe.details {
        ProbeDetails::DeepSeek(Some(balance)) => {
            display.total_balance = format_usd(balance.total);
            display.granted = format_usd(balance.granted);
            display.topped_up = format_usd(balance.topped_up);
            internals.balance_value = balance.total;
            internals.balances = balance.balances.clone();
        }
        ProbeDetails::Gemini(Some(validity)) => {
            internals.models_available = Some(validity.models_available);
            internals.note = Some(validity.note.clone());
            internals.dashboard_url = Some(validity.dashboard_url.clone());
        }
        ProbeDetails::DeepSeek(None) | ProbeDetails::Gemini(None) => {}
    }

    let mut record = AggregatedRecord { display, internals };
    record.apply_ping(ping);
    record
}

/// Overwrite ping fields of cached records that have a matching ping result
pub fn merge_ping_into_cached(records: &[AggregatedRecord], pings: &[PingResult]) -> Vec<AggregatedRecord> {
    let by_service: HashMap<&str, &PingResult> =
        pings.iter().map(|ping| (ping.service.as_str(), ping)).collect();

    records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            if let Some(ping) = by_service.get(record.service()) {
                record.apply_ping(ping);
            }
            record
        })
        .collect()
}

/// True when both sides name exactly the same set of services
pub fn ping_services_match(records: &[AggregatedRecord], pings: &[PingResult]) -> bool {
    let cached: HashSet<&str> = records.iter().map(|r| r.service()).collect();
    let pinged: HashSet<&str> = pings.iter().map(|p| p.service.as_str()).collect();
    cached == pinged
}
