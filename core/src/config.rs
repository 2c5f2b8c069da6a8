use crate::{
    rule::{RuleType, Severity},
    traffic::TrafficProfile,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ── Currency rates ───────────────────────────────────────────────────────────

/// USD value of one unit of each currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyTable {
    usd_per_unit: HashMap<String, Decimal>,
}

impl CurrencyTable {
    pub fn new(rates: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self { usd_per_unit: rates.into_iter().collect() }
    }

    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        self.usd_per_unit.get(currency).copied()
    }

    /// Convert `amount` from one currency to another. Same-currency
    /// conversion is exact and never consults the table.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, ConversionError> {
        if from == to {
            return Ok(amount);
        }
        let unknown = || ConversionError::UnknownRate { from: from.to_string(), to: to.to_string() };
        let from_rate = self.rate(from).ok_or_else(unknown)?;
        let to_rate = self.rate(to).filter(|r| !r.is_zero()).ok_or_else(unknown)?;
        amount
            .checked_mul(from_rate)
            .and_then(|usd| usd.checked_div(to_rate))
            .ok_or_else(|| ConversionError::OutOfRange { amount, from: from.to_string(), to: to.to_string() })
    }

    pub fn to_usd(&self, amount: Decimal, from: &str) -> Result<Decimal, ConversionError> {
        self.convert(amount, from, "USD")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("no exchange rate to convert {from} into {to}")]
    UnknownRate { from: String, to: String },

    #[error("{amount} {from} is out of range when converted into {to}")]
    OutOfRange { amount: Decimal, from: String, to: String },
}

// ── Auto-action policy ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RejectTransaction,
    SuspendMerchant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEntry {
    pub rule_type:    RuleType,
    #[serde(default)]
    pub min_severity: Option<Severity>,
    pub action:       ActionKind,
}

/// Ordered decision table. First matching entry wins; anything unmatched
/// falls through to `default_action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoActionPolicy {
    pub entries:        Vec<PolicyEntry>,
    pub default_action: ActionKind,
}

impl AutoActionPolicy {
    pub fn decide(&self, rule_type: RuleType, severity: Severity) -> ActionKind {
        self.entries
            .iter()
            .find(|e| e.rule_type == rule_type && e.min_severity.map_or(true, |min| severity >= min))
            .map(|e| e.action)
            .unwrap_or(self.default_action)
    }
}

impl Default for AutoActionPolicy {
    fn default() -> Self {
        let entry = |rule_type, min_severity, action| PolicyEntry { rule_type, min_severity, action };
        Self {
            entries: vec![
                entry(RuleType::AddressBlacklist,    None,                 ActionKind::RejectTransaction),
                entry(RuleType::CountryBlock,        None,                 ActionKind::RejectTransaction),
                entry(RuleType::TransactionVelocity, Some(Severity::High), ActionKind::SuspendMerchant),
                entry(RuleType::MerchantVolume,      Some(Severity::High), ActionKind::SuspendMerchant),
            ],
            default_action: ActionKind::RejectTransaction,
        }
    }
}

// ── Engine config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskConfig {
    pub resolution_min_length:  usize,
    pub evaluation_timeout_ms:  u64,
    pub serialize_per_merchant: bool,
    pub currency_rates:         CurrencyTable,
    #[serde(default)]
    pub auto_action_policy:     AutoActionPolicy,
    #[serde(default)]
    pub permissions:            HashMap<String, Vec<String>>,
    /// Synthetic traffic shape for the runner.
    #[serde(default)]
    pub traffic:                TrafficProfile,
}

impl RiskConfig {
    /// Load from `{data_dir}/risk_engine.json`.
    /// In tests, use RiskConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/risk_engine.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: RiskConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if config.resolution_min_length == 0 {
            anyhow::bail!("{path}: resolutionMinLength must be positive");
        }
        if config.currency_rates.rate("USD").is_none() {
            anyhow::bail!("{path}: currencyRates must include USD");
        }
        Ok(config)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        let rate = |code: &str, usd: i64, scale: u32| (code.to_string(), Decimal::new(usd, scale));
        let caps = |list: &[&str]| list.iter().map(|c| c.to_string()).collect::<Vec<_>>();

        Self {
            resolution_min_length:  20,
            evaluation_timeout_ms:  2_000,
            serialize_per_merchant: true,
            currency_rates: CurrencyTable::new([
                rate("USD", 1, 0),
                rate("EUR", 108, 2),
                rate("GBP", 127, 2),
                rate("NGN", 65, 5),
            ]),
            auto_action_policy: AutoActionPolicy::default(),
            permissions: HashMap::from([
                ("ADMIN".to_string(), caps(&[
                    "risk:rules:read",
                    "risk:rules:write",
                    "risk:alerts:read",
                    "risk:alerts:resolve",
                ])),
                ("ANALYST".to_string(), caps(&[
                    "risk:rules:read",
                    "risk:alerts:read",
                    "risk:alerts:resolve",
                ])),
                ("VIEWER".to_string(), caps(&["risk:rules:read", "risk:alerts:read"])),
            ]),
            traffic: TrafficProfile::default(),
        }
    }
}
