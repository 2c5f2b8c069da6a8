//! Condition evaluator tests: comparison boundaries, currency normalization,
//! blacklist matching, country blocks and aggregate-backed rule types.

use chrono::{TimeZone, Utc};
use riskwatch_core::{
    condition::{evaluate, ConditionContext, EvaluationError},
    config::RiskConfig,
    event::TransactionEvent,
    rule::{Comparison, RuleConditions, Window},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

fn event(amount: Decimal, currency: &str) -> TransactionEvent {
    TransactionEvent {
        transaction_id: "T1".into(),
        merchant_id:    "M1".into(),
        amount,
        currency:       currency.into(),
        from_address:   Some("0xFROM".into()),
        to_address:     Some("0xTO".into()),
        country:        None,
        occurred_at:    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    }
}

fn amount_rule(threshold: Decimal, comparison: Comparison) -> RuleConditions {
    RuleConditions::TransactionAmount { threshold, currency: "USD".into(), comparison }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn triggered(conditions: &RuleConditions, event: &TransactionEvent) -> bool {
    let config = RiskConfig::default_test();
    let ctx = ConditionContext {
        event,
        merchant_country: None,
        rates: &config.currency_rates,
        window_count: None,
        window_volume: None,
    };
    evaluate("test", conditions, &ctx).unwrap().triggered
}

/// gt 1000: 1000.00 does not trigger, 1000.01 does, 999.99 does not.
#[test]
fn gt_threshold_boundary_is_exact() {
    let rule = amount_rule(dec!(1000), Comparison::Gt);
    assert!(!triggered(&rule, &event(dec!(1000.00), "USD")));
    assert!(triggered(&rule, &event(dec!(1000.01), "USD")));
    assert!(!triggered(&rule, &event(dec!(999.99), "USD")));
}

/// Every comparison operator at, above and below the threshold.
#[test]
fn comparison_operators() {
    let cases = [
        (Comparison::Gte, [true, true, false]),
        (Comparison::Lt,  [false, false, true]),
        (Comparison::Lte, [true, false, true]),
        (Comparison::Eq,  [true, false, false]),
    ];
    for (op, [at, above, below]) in cases {
        let rule = amount_rule(dec!(500), op);
        assert_eq!(triggered(&rule, &event(dec!(500.00), "USD")), at, "{op:?} at threshold");
        assert_eq!(triggered(&rule, &event(dec!(500.01), "USD")), above, "{op:?} above threshold");
        assert_eq!(triggered(&rule, &event(dec!(499.99), "USD")), below, "{op:?} below threshold");
    }
}

/// Amounts are normalized into the rule's currency before comparing.
#[test]
fn amount_is_converted_into_rule_currency() {
    let rule = amount_rule(dec!(1000), Comparison::Gt);
    // 1000 EUR = 1080 USD at the test rate.
    assert!(triggered(&rule, &event(dec!(1000), "EUR")));
    // 900 EUR = 972 USD.
    assert!(!triggered(&rule, &event(dec!(900), "EUR")));
}

/// A currency with no configured rate is an evaluation error, not a silent miss.
#[test]
fn unknown_rate_is_an_error() {
    let config = RiskConfig::default_test();
    let ev = event(dec!(10), "JPY");
    let ctx = ConditionContext {
        event: &ev,
        merchant_country: None,
        rates: &config.currency_rates,
        window_count: None,
        window_volume: None,
    };
    let err = evaluate("jpy", &amount_rule(dec!(1), Comparison::Gt), &ctx).unwrap_err();
    assert!(matches!(err, EvaluationError::UnknownCurrencyRate { .. }), "got {err:?}");
}

/// Message names the rule, the observed value and the threshold, and is
/// identical for identical inputs.
#[test]
fn message_is_deterministic() {
    let config = RiskConfig::default_test();
    let ev = event(dec!(50001), "USD");
    let ctx = ConditionContext {
        event: &ev,
        merchant_country: None,
        rates: &config.currency_rates,
        window_count: None,
        window_volume: None,
    };
    let rule = amount_rule(dec!(50000), Comparison::Gt);
    let first = evaluate("Large payment", &rule, &ctx).unwrap();
    let second = evaluate("Large payment", &rule, &ctx).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.message, "Rule 'Large payment' triggered: amount 50001 USD gt 50000 USD");
}

/// Blacklist matching ignores case on both sides of the transfer.
#[test]
fn blacklist_is_case_insensitive() {
    let rule = RuleConditions::AddressBlacklist { addresses: set(&["0xABCDEF"]) };

    let mut ev = event(dec!(1), "USD");
    ev.from_address = Some("0xabcdef".into());
    assert!(triggered(&rule, &ev));

    ev.from_address = Some("0x111111".into());
    ev.to_address = Some("0XAbCdEf".into());
    assert!(triggered(&rule, &ev));

    ev.to_address = None;
    assert!(!triggered(&rule, &ev));
}

/// Surrounding whitespace on a listed entry does not hide a match.
#[test]
fn blacklist_ignores_padding_on_entries() {
    let rule = RuleConditions::AddressBlacklist { addresses: set(&[" 0xABC "]) };

    let mut ev = event(dec!(1), "USD");
    ev.from_address = Some("0xabc".into());
    assert!(triggered(&rule, &ev));

    ev.from_address = Some("  0xAbC\t".into());
    assert!(triggered(&rule, &ev));
}

/// A conversion that overflows the decimal range is an error, not a panic.
#[test]
fn conversion_overflow_is_an_error() {
    let config = RiskConfig::default_test();
    let ev = event(Decimal::MAX, "EUR");
    let ctx = ConditionContext {
        event: &ev,
        merchant_country: None,
        rates: &config.currency_rates,
        window_count: None,
        window_volume: None,
    };
    let err = evaluate("huge", &amount_rule(dec!(1), Comparison::Gt), &ctx).unwrap_err();
    assert!(matches!(err, EvaluationError::AmountOutOfRange(_)), "got {err:?}");
}

/// Country block uses the resolved merchant country; unknown never triggers.
#[test]
fn country_block_membership() {
    let config = RiskConfig::default_test();
    let rule = RuleConditions::CountryBlock { countries: set(&["KP", "IR"]) };
    let ev = event(dec!(1), "USD");

    let check = |country: Option<&str>| {
        let ctx = ConditionContext {
            event: &ev,
            merchant_country: country,
            rates: &config.currency_rates,
            window_count: None,
            window_volume: None,
        };
        evaluate("embargo", &rule, &ctx).unwrap().triggered
    };

    assert!(check(Some("KP")));
    assert!(check(Some("ir")));
    assert!(!check(Some("US")));
    assert!(!check(None));
}

/// Velocity and volume compare the supplied aggregate, inclusively.
#[test]
fn window_rules_use_supplied_aggregates() {
    let config = RiskConfig::default_test();
    let ev = event(dec!(1), "USD");
    let velocity = RuleConditions::TransactionVelocity {
        transaction_count: 3,
        window: Window::parse("1h").unwrap(),
    };
    let volume = RuleConditions::MerchantVolume {
        volume_threshold: dec!(1000),
        time_window: Window::parse("24h").unwrap(),
    };

    let ctx = |count: Option<u64>, sum: Option<Decimal>| ConditionContext {
        event: &ev,
        merchant_country: None,
        rates: &config.currency_rates,
        window_count: count,
        window_volume: sum,
    };

    assert!(!evaluate("v", &velocity, &ctx(Some(2), None)).unwrap().triggered);
    assert!(evaluate("v", &velocity, &ctx(Some(3), None)).unwrap().triggered);
    assert!(!evaluate("m", &volume, &ctx(None, Some(dec!(999.99)))).unwrap().triggered);
    assert!(evaluate("m", &volume, &ctx(None, Some(dec!(1000)))).unwrap().triggered);

    let err = evaluate("v", &velocity, &ctx(None, None)).unwrap_err();
    assert!(matches!(err, EvaluationError::MissingAggregate { .. }));
}
