//! Condition evaluator.
//!
//! Pure: (conditions, context) → triggered + message. No I/O, no clock.
//! Window aggregates for velocity/volume rules are computed by the caller
//! and handed in through the context.
//!
//! Messages are deterministic for identical inputs: rule name, observed
//! value and threshold/window, nothing time- or order-dependent.

use crate::{
    config::{ConversionError, CurrencyTable},
    event::TransactionEvent,
    rule::{Comparison, RuleConditions, RuleType, Window},
};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use thiserror::Error;

pub struct ConditionContext<'a> {
    pub event:            &'a TransactionEvent,
    /// Merchant country, from the event or the merchant directory.
    pub merchant_country: Option<&'a str>,
    pub rates:            &'a CurrencyTable,
    /// Transactions in the rule's trailing window. Required for TRANSACTION_VELOCITY.
    pub window_count:     Option<u64>,
    /// USD volume in the rule's trailing window. Required for MERCHANT_VOLUME.
    pub window_volume:    Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub triggered: bool,
    pub message:   String,
}

/// A single rule could not be evaluated. Never escapes the evaluation
/// service; it becomes a non-triggered result carrying this message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("no exchange rate to convert {from} into {to}")]
    UnknownCurrencyRate { from: String, to: String },

    #[error("{rule_type} rule evaluated without a window aggregate")]
    MissingAggregate { rule_type: RuleType },

    #[error("{0}")]
    AmountOutOfRange(String),

    #[error("window aggregation failed: {0}")]
    Aggregation(String),

    #[error("merchant lookup failed: {0}")]
    MerchantLookup(String),

    #[error("evaluator panicked: {0}")]
    Panicked(String),

    #[error("evaluation budget exhausted before this rule ran")]
    TimedOut,
}

pub fn evaluate(
    rule_name: &str,
    conditions: &RuleConditions,
    ctx: &ConditionContext<'_>,
) -> Result<ConditionOutcome, EvaluationError> {
    match conditions {
        RuleConditions::TransactionAmount { threshold, currency, comparison } => {
            evaluate_amount(rule_name, *threshold, currency, *comparison, ctx)
        }
        RuleConditions::TransactionVelocity { transaction_count, window } => {
            let count = ctx.window_count.ok_or(EvaluationError::MissingAggregate {
                rule_type: RuleType::TransactionVelocity,
            })?;
            Ok(evaluate_velocity(rule_name, *transaction_count, *window, &ctx.event.merchant_id, count))
        }
        RuleConditions::MerchantVolume { volume_threshold, time_window } => {
            let volume = ctx.window_volume.ok_or(EvaluationError::MissingAggregate {
                rule_type: RuleType::MerchantVolume,
            })?;
            Ok(evaluate_volume(rule_name, *volume_threshold, *time_window, &ctx.event.merchant_id, volume))
        }
        RuleConditions::AddressBlacklist { addresses } => {
            Ok(evaluate_blacklist(rule_name, addresses, ctx.event))
        }
        RuleConditions::CountryBlock { countries } => {
            Ok(evaluate_country(rule_name, countries, ctx.merchant_country))
        }
    }
}

fn outcome(rule_name: &str, triggered: bool, detail: String) -> ConditionOutcome {
    let verdict = if triggered { "triggered" } else { "not triggered" };
    ConditionOutcome {
        triggered,
        message: format!("Rule '{rule_name}' {verdict}: {detail}"),
    }
}

fn evaluate_amount(
    rule_name: &str,
    threshold: Decimal,
    currency: &str,
    comparison: Comparison,
    ctx: &ConditionContext<'_>,
) -> Result<ConditionOutcome, EvaluationError> {
    let event = ctx.event;
    let observed = ctx
        .rates
        .convert(event.amount, &event.currency, currency)
        .map_err(|e| match e {
            ConversionError::UnknownRate { from, to } => EvaluationError::UnknownCurrencyRate { from, to },
            out_of_range @ ConversionError::OutOfRange { .. } => {
                EvaluationError::AmountOutOfRange(out_of_range.to_string())
            }
        })?;

    let triggered = comparison.apply(observed, threshold);
    let op = comparison.as_str();
    let mut detail = if triggered {
        format!("amount {} {currency} {op} {} {currency}", observed.normalize(), threshold.normalize())
    } else {
        format!("amount {} {currency} not {op} {} {currency}", observed.normalize(), threshold.normalize())
    };
    if event.currency != currency {
        detail.push_str(&format!(" (from {} {})", event.amount.normalize(), event.currency));
    }
    Ok(outcome(rule_name, triggered, detail))
}

fn evaluate_velocity(
    rule_name: &str,
    limit: u32,
    window: Window,
    merchant_id: &str,
    count: u64,
) -> ConditionOutcome {
    let triggered = count >= u64::from(limit);
    let detail = format!(
        "{count} transactions for merchant {merchant_id} in trailing {window} (limit {limit})"
    );
    outcome(rule_name, triggered, detail)
}

fn evaluate_volume(
    rule_name: &str,
    threshold: Decimal,
    window: Window,
    merchant_id: &str,
    volume: Decimal,
) -> ConditionOutcome {
    let triggered = volume >= threshold;
    let detail = format!(
        "volume {} USD for merchant {merchant_id} in trailing {window} (threshold {} USD)",
        volume.normalize(),
        threshold.normalize()
    );
    outcome(rule_name, triggered, detail)
}

fn evaluate_blacklist(
    rule_name: &str,
    addresses: &BTreeSet<String>,
    event: &TransactionEvent,
) -> ConditionOutcome {
    let hit = [("from", &event.from_address), ("to", &event.to_address)]
        .into_iter()
        .filter_map(|(side, addr)| addr.as_deref().map(|a| (side, a)))
        .find(|(_, addr)| addresses.iter().any(|listed| listed.trim().eq_ignore_ascii_case(addr.trim())));

    match hit {
        Some((side, addr)) => outcome(rule_name, true, format!("{side}-address {addr} is blacklisted")),
        None => outcome(
            rule_name,
            false,
            format!("no address matches the blacklist ({} entries)", addresses.len()),
        ),
    }
}

fn evaluate_country(
    rule_name: &str,
    countries: &BTreeSet<String>,
    merchant_country: Option<&str>,
) -> ConditionOutcome {
    match merchant_country {
        Some(country) => {
            let normalized = country.trim().to_ascii_uppercase();
            let blocked = countries.contains(&normalized);
            let detail = if blocked {
                format!("merchant country {normalized} is blocked")
            } else {
                format!("merchant country {normalized} is not blocked")
            };
            outcome(rule_name, blocked, detail)
        }
        None => outcome(rule_name, false, "merchant country unknown".to_string()),
    }
}
