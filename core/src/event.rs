//! Incoming events and the per-rule evaluation results they produce.

use crate::{
    rule::{RuleType, Severity},
    types::{EntityId, Timestamp},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kinds of event the engine accepts. New kinds get their own row in
/// `relevant_rule_types`; relevance is never inferred from the payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Transaction,
}

/// Static event-kind → rule-type table.
pub fn relevant_rule_types(kind: EventKind) -> &'static [RuleType] {
    match kind {
        EventKind::Transaction => &RuleType::ALL,
    }
}

/// A merchant transaction as delivered by the transaction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    pub transaction_id: EntityId,
    pub merchant_id:    EntityId,
    pub amount:         Decimal,
    pub currency:       String,
    #[serde(default)]
    pub from_address:   Option<String>,
    #[serde(default)]
    pub to_address:     Option<String>,
    /// Merchant country if the source already knows it; otherwise the
    /// merchant directory is consulted.
    #[serde(default)]
    pub country:        Option<String>,
    pub occurred_at:    Timestamp,
}

impl TransactionEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::Transaction
    }
}

/// Outcome of evaluating one rule against one event. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluationResult {
    pub rule_id:   EntityId,
    pub rule_name: String,
    pub triggered: bool,
    pub severity:  Severity,
    pub message:   String,
}
