//! Risk rules: the operator-configured predicates the engine evaluates.
//!
//! `RuleConditions` is a tagged union keyed by rule type. Each variant carries
//! only the fields its rule family needs, so a velocity rule can never be
//! stored with a blacklist or a missing window.

use crate::{
    error::{RiskError, RiskResult},
    types::{EntityId, Timestamp},
};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ── Enumerations ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    TransactionAmount,
    TransactionVelocity,
    MerchantVolume,
    AddressBlacklist,
    CountryBlock,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::TransactionAmount,
        RuleType::TransactionVelocity,
        RuleType::MerchantVolume,
        RuleType::AddressBlacklist,
        RuleType::CountryBlock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionAmount   => "TRANSACTION_AMOUNT",
            Self::TransactionVelocity => "TRANSACTION_VELOCITY",
            Self::MerchantVolume      => "MERCHANT_VOLUME",
            Self::AddressBlacklist    => "ADDRESS_BLACKLIST",
            Self::CountryBlock        => "COUNTRY_BLOCK",
        }
    }

    /// Whether evaluating this rule type needs a trailing-window aggregate.
    pub fn is_windowed(&self) -> bool {
        matches!(self, Self::TransactionVelocity | Self::MerchantVolume)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        RuleType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RiskError::validation("ruleType", format!("unknown rule type '{s}'")))
    }
}

/// Ordinal severity. Ordering is LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low      => "LOW",
            Self::Medium   => "MEDIUM",
            Self::High     => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        match s {
            "LOW"      => Ok(Self::Low),
            "MEDIUM"   => Ok(Self::Medium),
            "HIGH"     => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other      => Err(RiskError::validation("severity", format!("unknown severity '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Comparison {
    pub fn apply(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Gt  => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt  => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq  => value == threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt  => "gt",
            Self::Gte => "gte",
            Self::Lt  => "lt",
            Self::Lte => "lte",
            Self::Eq  => "eq",
        }
    }
}

// ── Trailing window ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Minutes,
    Hours,
    Days,
}

/// A parsed duration string such as `"1h"`, `"24h"` or `"7d"`.
///
/// Only constructible through `Window::parse`, so a stored window is always
/// positive and in a known unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Window {
    amount: u32,
    unit:   WindowUnit,
}

impl Window {
    /// Longest accepted window: 3650 days.
    pub const MAX_MINUTES: u64 = 3650 * 24 * 60;

    pub fn parse(raw: &str) -> RiskResult<Self> {
        let raw = raw.trim();
        let invalid = |why: &str| RiskError::validation("window", format!("'{raw}': {why}"));

        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit (expected m, h or d)"))?;
        let (digits, suffix) = raw.split_at(split);
        if digits.is_empty() {
            return Err(invalid("missing amount"));
        }
        let amount: u32 = digits.parse().map_err(|_| invalid("amount out of range"))?;
        if amount == 0 {
            return Err(invalid("must be positive"));
        }
        let unit = match suffix {
            "m" => WindowUnit::Minutes,
            "h" => WindowUnit::Hours,
            "d" => WindowUnit::Days,
            other => return Err(invalid(&format!("unknown unit '{other}'"))),
        };
        let window = Self { amount, unit };
        if window.minutes() > Self::MAX_MINUTES {
            return Err(invalid("longer than 3650d"));
        }
        Ok(window)
    }

    fn minutes(&self) -> u64 {
        let n = u64::from(self.amount);
        match self.unit {
            WindowUnit::Minutes => n,
            WindowUnit::Hours   => n * 60,
            WindowUnit::Days    => n * 24 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        let n = i64::from(self.amount);
        match self.unit {
            WindowUnit::Minutes => Duration::minutes(n),
            WindowUnit::Hours   => Duration::hours(n),
            WindowUnit::Days    => Duration::days(n),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            WindowUnit::Minutes => "m",
            WindowUnit::Hours   => "h",
            WindowUnit::Days    => "d",
        };
        write!(f, "{}{}", self.amount, unit)
    }
}

impl TryFrom<String> for Window {
    type Error = RiskError;

    fn try_from(raw: String) -> RiskResult<Self> {
        Window::parse(&raw)
    }
}

impl From<Window> for String {
    fn from(w: Window) -> String {
        w.to_string()
    }
}

// ── Conditions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ruleType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleConditions {
    #[serde(rename_all = "camelCase")]
    TransactionAmount {
        threshold:  Decimal,
        currency:   String,
        comparison: Comparison,
    },
    #[serde(rename_all = "camelCase")]
    TransactionVelocity {
        transaction_count: u32,
        window:            Window,
    },
    #[serde(rename_all = "camelCase")]
    MerchantVolume {
        volume_threshold: Decimal,
        time_window:      Window,
    },
    AddressBlacklist {
        addresses: BTreeSet<String>,
    },
    CountryBlock {
        countries: BTreeSet<String>,
    },
}

impl RuleConditions {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::TransactionAmount { .. }   => RuleType::TransactionAmount,
            Self::TransactionVelocity { .. } => RuleType::TransactionVelocity,
            Self::MerchantVolume { .. }      => RuleType::MerchantVolume,
            Self::AddressBlacklist { .. }    => RuleType::AddressBlacklist,
            Self::CountryBlock { .. }        => RuleType::CountryBlock,
        }
    }

    /// The trailing window this rule aggregates over, if any.
    pub fn window(&self) -> Option<Window> {
        match self {
            Self::TransactionVelocity { window, .. } => Some(*window),
            Self::MerchantVolume { time_window, .. } => Some(*time_window),
            _ => None,
        }
    }

    /// Decode an untyped condition blob against a declared rule type.
    ///
    /// This is the write-time gate for conditions arriving from the API
    /// layer: the blob must carry exactly the shape of `rule_type`.
    pub fn from_json(rule_type: RuleType, blob: &serde_json::Value) -> RiskResult<Self> {
        let mut object = blob
            .as_object()
            .cloned()
            .ok_or_else(|| RiskError::validation("conditions", "must be a JSON object"))?;
        let allowed = Self::field_names(rule_type);
        if let Some(extra) = object.keys().find(|k| *k != "ruleType" && !allowed.contains(&k.as_str())) {
            return Err(RiskError::validation(
                format!("conditions.{extra}"),
                format!("unknown field for {}", rule_type.as_str()),
            ));
        }
        object.insert("ruleType".into(), serde_json::Value::String(rule_type.as_str().into()));

        let conditions: RuleConditions = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| RiskError::validation("conditions", e.to_string()))?;
        conditions.validate()?;
        Ok(conditions)
    }

    /// Canonical stored form: blacklist entries lose surrounding whitespace.
    pub fn normalize(&mut self) {
        if let Self::AddressBlacklist { addresses } = self {
            *addresses = addresses.iter().map(|a| a.trim().to_string()).collect();
        }
    }

    /// Wire names of the condition fields each rule type accepts.
    fn field_names(rule_type: RuleType) -> &'static [&'static str] {
        match rule_type {
            RuleType::TransactionAmount   => &["threshold", "currency", "comparison"],
            RuleType::TransactionVelocity => &["transactionCount", "window"],
            RuleType::MerchantVolume      => &["volumeThreshold", "timeWindow"],
            RuleType::AddressBlacklist    => &["addresses"],
            RuleType::CountryBlock        => &["countries"],
        }
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> RiskResult<()> {
        match self {
            Self::TransactionAmount { threshold, currency, .. } => {
                if threshold.is_sign_negative() {
                    return Err(RiskError::validation("conditions.threshold", "must not be negative"));
                }
                validate_currency_code(currency)
            }
            Self::TransactionVelocity { transaction_count, .. } => {
                if *transaction_count == 0 {
                    return Err(RiskError::validation(
                        "conditions.transactionCount",
                        "must be at least 1",
                    ));
                }
                Ok(())
            }
            Self::MerchantVolume { volume_threshold, .. } => {
                if volume_threshold.is_sign_negative() || volume_threshold.is_zero() {
                    return Err(RiskError::validation(
                        "conditions.volumeThreshold",
                        "must be positive",
                    ));
                }
                Ok(())
            }
            Self::AddressBlacklist { addresses } => {
                if addresses.is_empty() {
                    return Err(RiskError::validation("conditions.addresses", "must not be empty"));
                }
                if addresses.iter().any(|a| a.trim().is_empty()) {
                    return Err(RiskError::validation(
                        "conditions.addresses",
                        "entries must not be blank",
                    ));
                }
                Ok(())
            }
            Self::CountryBlock { countries } => {
                if countries.is_empty() {
                    return Err(RiskError::validation("conditions.countries", "must not be empty"));
                }
                match countries.iter().find(|c| !is_iso_country(c)) {
                    Some(bad) => Err(RiskError::validation(
                        "conditions.countries",
                        format!("'{bad}' is not an ISO 3166 alpha-2 code"),
                    )),
                    None => Ok(()),
                }
            }
        }
    }
}

fn validate_currency_code(code: &str) -> RiskResult<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(RiskError::validation(
            "conditions.currency",
            format!("'{code}' is not an ISO 4217 code"),
        ))
    }
}

fn is_iso_country(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase())
}

// ── Rule records ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRule {
    pub id:            EntityId,
    pub name:          String,
    pub description:   String,
    pub rule_type:     RuleType,
    pub conditions:    RuleConditions,
    pub severity:      Severity,
    pub is_enabled:    bool,
    pub auto_block:    bool,
    pub created_by_id: Option<String>,
    pub created_at:    Timestamp,
    pub updated_at:    Timestamp,
    pub deleted_at:    Option<Timestamp>,
}

impl RiskRule {
    /// Only live, enabled rules may ever produce an alert.
    pub fn is_active(&self) -> bool {
        self.is_enabled && self.deleted_at.is_none()
    }
}

/// Input for creating a rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub name:          String,
    #[serde(default)]
    pub description:   String,
    pub conditions:    RuleConditions,
    pub severity:      Severity,
    #[serde(default = "default_true")]
    pub is_enabled:    bool,
    #[serde(default)]
    pub auto_block:    bool,
    #[serde(default)]
    pub created_by_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NewRule {
    pub fn new(name: impl Into<String>, conditions: RuleConditions, severity: Severity) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            conditions,
            severity,
            is_enabled: true,
            auto_block: false,
            created_by_id: None,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn auto_block(mut self, on: bool) -> Self {
        self.auto_block = on;
        self
    }

    pub fn enabled(mut self, on: bool) -> Self {
        self.is_enabled = on;
        self
    }

    pub fn created_by(mut self, actor_id: impl Into<String>) -> Self {
        self.created_by_id = Some(actor_id.into());
        self
    }

    pub fn validate(&self) -> RiskResult<()> {
        if self.name.trim().is_empty() {
            return Err(RiskError::validation("name", "must not be empty"));
        }
        self.conditions.validate()
    }
}

/// Partial update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePatch {
    pub name:        Option<String>,
    pub description: Option<String>,
    pub conditions:  Option<RuleConditions>,
    pub severity:    Option<Severity>,
    pub is_enabled:  Option<bool>,
    pub auto_block:  Option<bool>,
}

impl RulePatch {
    pub fn validate(&self) -> RiskResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(RiskError::validation("name", "must not be empty"));
            }
        }
        match &self.conditions {
            Some(c) => c.validate(),
            None => Ok(()),
        }
    }

    /// Apply onto an existing rule. The rule type follows the conditions.
    pub fn apply_to(self, rule: &mut RiskRule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(description) = self.description {
            rule.description = description;
        }
        if let Some(conditions) = self.conditions {
            rule.rule_type = conditions.rule_type();
            rule.conditions = conditions;
        }
        if let Some(severity) = self.severity {
            rule.severity = severity;
        }
        if let Some(enabled) = self.is_enabled {
            rule.is_enabled = enabled;
        }
        if let Some(auto_block) = self.auto_block {
            rule.auto_block = auto_block;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub enabled:         Option<bool>,
    pub rule_type:       Option<RuleType>,
    pub include_deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_parses_known_units() {
        assert_eq!(Window::parse("1h").unwrap().duration(), Duration::hours(1));
        assert_eq!(Window::parse("24h").unwrap().duration(), Duration::hours(24));
        assert_eq!(Window::parse("7d").unwrap().duration(), Duration::days(7));
        assert_eq!(Window::parse("90m").unwrap().duration(), Duration::minutes(90));
        assert_eq!(Window::parse("7d").unwrap().to_string(), "7d");
    }

    #[test]
    fn window_rejects_garbage() {
        for raw in ["", "h", "0h", "-1h", "1w", "1.5h", "12", "1hh", "3651d", "87601h", "100000000d"] {
            assert!(
                matches!(Window::parse(raw), Err(RiskError::Validation { .. })),
                "expected '{raw}' to be rejected"
            );
        }
    }

    #[test]
    fn window_accepts_up_to_ten_years() {
        assert!(Window::parse("3650d").is_ok());
        assert!(Window::parse("87600h").is_ok());
        assert!(Window::parse("5256000m").is_ok());
    }

    #[test]
    fn conditions_reject_wrong_shape_for_type() {
        let blob = serde_json::json!({ "addresses": ["0xabc"] });
        let err = RuleConditions::from_json(RuleType::TransactionAmount, &blob).unwrap_err();
        assert!(matches!(err, RiskError::Validation { ref field, .. } if field == "conditions"));
    }

    #[test]
    fn conditions_reject_fields_of_another_type() {
        let blob = serde_json::json!({
            "threshold": "1000",
            "currency": "USD",
            "comparison": "gt",
            "addresses": ["0xabc"],
        });
        let err = RuleConditions::from_json(RuleType::TransactionAmount, &blob).unwrap_err();
        assert!(
            matches!(err, RiskError::Validation { ref field, .. } if field == "conditions.addresses"),
            "got {err:?}"
        );
    }

    #[test]
    fn severity_orders_by_rank() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
