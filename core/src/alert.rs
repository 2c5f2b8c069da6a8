//! Risk alerts and their read-side views.

use crate::{
    error::{RiskError, RiskResult},
    rule::Severity,
    types::{EntityId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open     => "OPEN",
            Self::Resolved => "RESOLVED",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        match s {
            "OPEN"     => Ok(Self::Open),
            "RESOLVED" => Ok(Self::Resolved),
            other      => Err(RiskError::validation("status", format!("unknown alert status '{other}'"))),
        }
    }
}

/// What the auto-action executor actually accomplished for an alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoActionTaken {
    NoAction,
    SuspendedMerchant,
    RejectedTransaction,
}

impl AutoActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAction            => "NO_ACTION",
            Self::SuspendedMerchant   => "SUSPENDED_MERCHANT",
            Self::RejectedTransaction => "REJECTED_TRANSACTION",
        }
    }
}

impl fmt::Display for AutoActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoActionTaken {
    type Err = RiskError;

    fn from_str(s: &str) -> RiskResult<Self> {
        match s {
            "NO_ACTION"            => Ok(Self::NoAction),
            "SUSPENDED_MERCHANT"   => Ok(Self::SuspendedMerchant),
            "REJECTED_TRANSACTION" => Ok(Self::RejectedTransaction),
            other => Err(RiskError::validation(
                "autoActionTaken",
                format!("unknown action '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAlert {
    pub id:                      EntityId,
    pub severity:                Severity,
    #[serde(rename = "type")]
    pub alert_type:              String,
    pub message:                 String,
    pub affected_transaction_id: Option<EntityId>,
    pub affected_merchant_id:    Option<EntityId>,
    pub triggered_rule_id:       EntityId,
    pub status:                  AlertStatus,
    pub auto_action_taken:       AutoActionTaken,
    pub resolution:              Option<String>,
    pub resolved_by_id:          Option<String>,
    pub resolved_at:             Option<Timestamp>,
    pub created_at:              Timestamp,
    pub updated_at:              Timestamp,
}

impl RiskAlert {
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

/// Input for materializing an alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub triggered_rule_id:       EntityId,
    pub severity:                Severity,
    pub alert_type:              String,
    pub message:                 String,
    pub affected_transaction_id: Option<EntityId>,
    pub affected_merchant_id:    Option<EntityId>,
}

impl NewAlert {
    pub fn validate(&self) -> RiskResult<()> {
        if self.triggered_rule_id.trim().is_empty() {
            return Err(RiskError::validation("triggeredRuleId", "must not be empty"));
        }
        if self.alert_type.trim().is_empty() {
            return Err(RiskError::validation("type", "must not be empty"));
        }
        Ok(())
    }
}

/// Alert listing filter. The default lists OPEN alerts only; set
/// `status` to `None` to list every status.
#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub status:         Option<AlertStatus>,
    pub min_severity:   Option<Severity>,
    pub merchant_id:    Option<EntityId>,
    pub transaction_id: Option<EntityId>,
    pub rule_id:        Option<EntityId>,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            status:         Some(AlertStatus::Open),
            min_severity:   None,
            merchant_id:    None,
            transaction_id: None,
            rule_id:        None,
        }
    }
}

impl AlertFilter {
    pub fn any_status() -> Self {
        Self { status: None, ..Self::default() }
    }

    pub fn matches(&self, alert: &RiskAlert) -> bool {
        self.status.map_or(true, |s| alert.status == s)
            && self.min_severity.map_or(true, |floor| alert.severity >= floor)
            && self.merchant_id.as_ref().map_or(true, |m| alert.affected_merchant_id.as_ref() == Some(m))
            && self.transaction_id.as_ref().map_or(true, |t| alert.affected_transaction_id.as_ref() == Some(t))
            && self.rule_id.as_ref().map_or(true, |r| &alert.triggered_rule_id == r)
    }
}

/// A transaction that has at least one alert against it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedTransaction {
    pub transaction_id:    EntityId,
    pub alert_id:          EntityId,
    pub severity:          Severity,
    pub triggered_rule_id: EntityId,
    #[serde(rename = "type")]
    pub alert_type:        String,
    pub message:           String,
    pub created_at:        Timestamp,
}

/// Per-merchant alert rollup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedMerchant {
    pub merchant_id:  EntityId,
    pub alert_count:  u64,
    pub max_severity: Severity,
}
