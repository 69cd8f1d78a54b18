//! Summary statistics over the balance view

use serde::Serialize;

use super::format::AggregatedRecord;
use crate::providers::{ProbeStatus, ProviderFamily};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceStats {
    pub total_balance: f64,
    pub average_balance: f64,
    pub lowest_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyStats {
    pub family: ProviderFamily,
    pub total_keys: usize,
    pub configured_keys: usize,
    pub active_keys: usize,
    /// Present only for balance-bearing families
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceStats>,
}

impl FamilyStats {
    pub fn is_active(&self) -> bool {
        self.active_keys > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_apis: usize,
    pub active_apis: usize,
    pub configured_apis: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub deepseek: FamilyStats,
    pub gemini: FamilyStats,
    pub overall: OverallStats,
}

impl StatsSummary {
    pub fn family(&self, family: ProviderFamily) -> &FamilyStats {
        match family {
            ProviderFamily::DeepSeek => &self.deepseek,
            ProviderFamily::Gemini => &self.gemini,
        }
    }
}

fn family_stats(records: &[AggregatedRecord], family: ProviderFamily) -> FamilyStats {
    let members: Vec<&AggregatedRecord> = records.iter().filter(|r| r.family() == family).collect();

    let configured_keys = members.iter().filter(|r| r.status() != ProbeStatus::NotConfigured).count();
    let active: Vec<&&AggregatedRecord> = members.iter().filter(|r| r.status() == ProbeStatus::Active).collect();

    let balance = family.has_balance().then(|| {
        let balances: Vec<f64> = active
            .iter()
            .map(|r| r.internals.balance_value)
            .filter(|value| *value > 0.0)
            .collect();

        if balances.is_empty() {
            return BalanceStats::default();
        }

        let total_balance: f64 = balances.iter().sum();
        BalanceStats {
            total_balance,
            average_balance: total_balance / balances.len() as f64,
            lowest_balance: balances.iter().copied().fold(f64::INFINITY, f64::min),
        }
    });

    FamilyStats {
        family,
        total_keys: members.len(),
        configured_keys,
        active_keys: active.len(),
        balance,
    }
}

/// Reduce the record set into per-family and overall counts
pub fn compute_stats(records: &[AggregatedRecord]) -> StatsSummary {
    let deepseek = family_stats(records, ProviderFamily::DeepSeek);
    let gemini = family_stats(records, ProviderFamily::Gemini);

    let overall = OverallStats {
        total_apis: records.len(),
        active_apis: deepseek.active_keys + gemini.active_keys,
        configured_apis: deepseek.configured_keys + gemini.configured_keys,
    };

    StatsSummary {
        deepseek,
        gemini,
        overall,
    }
}
