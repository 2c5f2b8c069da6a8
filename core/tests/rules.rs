//! Rule store tests: write-time validation per field, soft delete, partial
//! updates and listing filters.

use chrono::{Duration, TimeZone, Utc};
use riskwatch_core::{
    clock::{Clock, ManualClock},
    collaborators::{InMemoryMerchantDirectory, RecordingTransactionProcessor},
    config::RiskConfig,
    error::RiskError,
    facade::RiskDesk,
    rule::{Comparison, NewRule, RuleConditions, RuleFilter, RulePatch, RuleType, Severity, Window},
};
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;

fn build() -> (RiskDesk, Arc<ManualClock>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
    let desk = RiskDesk::in_memory(
        RiskConfig::default_test(),
        Arc::new(InMemoryMerchantDirectory::new()),
        Arc::new(RecordingTransactionProcessor::new()),
        clock.clone(),
    )
    .unwrap();
    (desk, clock)
}

fn amount_rule(name: &str) -> NewRule {
    NewRule::new(
        name,
        RuleConditions::TransactionAmount {
            threshold:  dec!(1000),
            currency:   "USD".into(),
            comparison: Comparison::Gt,
        },
        Severity::Medium,
    )
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn invalid_field(err: RiskError) -> String {
    match err {
        RiskError::Validation { field, .. } => field,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

/// Creation fills id, type and timestamps; reads return the same rule.
#[test]
fn create_and_get_round_trip() {
    let (desk, clock) = build();
    let rule = desk.create_rule(amount_rule("Big").described("over a grand")).unwrap();

    assert!(!rule.id.is_empty());
    assert_eq!(rule.rule_type, RuleType::TransactionAmount);
    assert!(rule.is_enabled, "rules default to enabled");
    assert!(!rule.auto_block, "autoBlock defaults to off");
    assert_eq!(rule.created_at, clock.now());
    assert_eq!(rule.created_at, rule.updated_at);
    assert!(rule.deleted_at.is_none());

    assert_eq!(desk.get_rule(&rule.id).unwrap(), rule);
}

/// Each malformed condition is reported against its own field.
#[test]
fn validation_names_the_bad_field() {
    let (desk, _) = build();

    let cases: Vec<(NewRule, &str)> = vec![
        (amount_rule("   "), "name"),
        (
            NewRule::new(
                "neg",
                RuleConditions::TransactionAmount {
                    threshold:  dec!(-1),
                    currency:   "USD".into(),
                    comparison: Comparison::Gt,
                },
                Severity::Low,
            ),
            "conditions.threshold",
        ),
        (
            NewRule::new(
                "cur",
                RuleConditions::TransactionAmount {
                    threshold:  dec!(1),
                    currency:   "usd".into(),
                    comparison: Comparison::Gt,
                },
                Severity::Low,
            ),
            "conditions.currency",
        ),
        (
            NewRule::new(
                "zero count",
                RuleConditions::TransactionVelocity {
                    transaction_count: 0,
                    window: Window::parse("1h").unwrap(),
                },
                Severity::Low,
            ),
            "conditions.transactionCount",
        ),
        (
            NewRule::new(
                "zero volume",
                RuleConditions::MerchantVolume {
                    volume_threshold: dec!(0),
                    time_window: Window::parse("24h").unwrap(),
                },
                Severity::Low,
            ),
            "conditions.volumeThreshold",
        ),
        (
            NewRule::new("empty list", RuleConditions::AddressBlacklist { addresses: set(&[]) }, Severity::Low),
            "conditions.addresses",
        ),
        (
            NewRule::new("bad iso", RuleConditions::CountryBlock { countries: set(&["USA"]) }, Severity::Low),
            "conditions.countries",
        ),
    ];

    for (spec, expected) in cases {
        let err = desk.create_rule(spec).unwrap_err();
        assert_eq!(invalid_field(err), expected);
    }
    assert!(desk.list_rules(&RuleFilter::default()).unwrap().is_empty(), "nothing persisted");
}

/// Condition blobs from the API layer must match the declared rule type,
/// and duration strings are checked when the rule is written.
#[test]
fn condition_blobs_are_checked_against_rule_type() {
    let wrong_shape = serde_json::json!({ "threshold": "5" });
    let err = RuleConditions::from_json(RuleType::TransactionVelocity, &wrong_shape).unwrap_err();
    assert_eq!(invalid_field(err), "conditions.threshold");

    let missing = serde_json::json!({ "transactionCount": 3 });
    let err = RuleConditions::from_json(RuleType::TransactionVelocity, &missing).unwrap_err();
    assert_eq!(invalid_field(err), "conditions");

    // Valid for its own type, plus a field belonging to another.
    let mixed = serde_json::json!({
        "threshold": "1000",
        "currency": "USD",
        "comparison": "gt",
        "addresses": ["0xabc"],
    });
    let err = RuleConditions::from_json(RuleType::TransactionAmount, &mixed).unwrap_err();
    assert_eq!(invalid_field(err), "conditions.addresses");

    let too_long = serde_json::json!({ "transactionCount": 3, "window": "100000000d" });
    let err = RuleConditions::from_json(RuleType::TransactionVelocity, &too_long).unwrap_err();
    assert_eq!(invalid_field(err), "conditions");

    let bad_window = serde_json::json!({ "transactionCount": 3, "window": "7w" });
    let err = RuleConditions::from_json(RuleType::TransactionVelocity, &bad_window).unwrap_err();
    assert_eq!(invalid_field(err), "conditions");

    let ok = serde_json::json!({ "transactionCount": 3, "window": "7d" });
    let conditions = RuleConditions::from_json(RuleType::TransactionVelocity, &ok).unwrap();
    assert_eq!(conditions.window().unwrap().duration(), Duration::days(7));
}

/// Blacklist entries are stored without surrounding whitespace.
#[test]
fn blacklist_entries_are_trimmed_on_write() {
    let (desk, _) = build();
    let rule = desk
        .create_rule(NewRule::new(
            "padded",
            RuleConditions::AddressBlacklist { addresses: set(&[" 0xABC ", "0xdef\t"]) },
            Severity::High,
        ))
        .unwrap();

    assert_eq!(
        rule.conditions,
        RuleConditions::AddressBlacklist { addresses: set(&["0xABC", "0xdef"]) }
    );
}

/// Soft delete hides the rule from reads and listings but keeps the row.
#[test]
fn soft_delete_hides_without_destroying() {
    let (desk, _) = build();
    let rule = desk.create_rule(amount_rule("Doomed")).unwrap();

    desk.delete_rule(&rule.id).unwrap();

    assert!(matches!(desk.get_rule(&rule.id), Err(RiskError::NotFound { .. })));
    assert!(desk.list_rules(&RuleFilter::default()).unwrap().is_empty());

    let history = desk
        .list_rules(&RuleFilter { include_deleted: true, ..RuleFilter::default() })
        .unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].deleted_at.is_some());

    assert!(matches!(desk.delete_rule(&rule.id), Err(RiskError::NotFound { .. })));
    assert!(matches!(
        desk.update_rule(&rule.id, RulePatch { severity: Some(Severity::High), ..RulePatch::default() }),
        Err(RiskError::NotFound { .. })
    ));
}

/// Patches touch only the given fields; the type follows new conditions.
#[test]
fn update_applies_partial_patch() {
    let (desk, clock) = build();
    let rule = desk.create_rule(amount_rule("Patchable")).unwrap();
    clock.advance(Duration::minutes(5));

    let updated = desk
        .update_rule(&rule.id, RulePatch { severity: Some(Severity::Critical), ..RulePatch::default() })
        .unwrap();
    assert_eq!(updated.severity, Severity::Critical);
    assert_eq!(updated.name, "Patchable");
    assert_eq!(updated.created_at, rule.created_at);
    assert!(updated.updated_at > rule.updated_at);

    let retyped = desk
        .update_rule(
            &rule.id,
            RulePatch {
                conditions: Some(RuleConditions::CountryBlock { countries: set(&["KP"]) }),
                ..RulePatch::default()
            },
        )
        .unwrap();
    assert_eq!(retyped.rule_type, RuleType::CountryBlock);
}

/// An invalid patch is rejected and leaves the stored rule untouched.
#[test]
fn invalid_patch_changes_nothing() {
    let (desk, _) = build();
    let rule = desk.create_rule(amount_rule("Stable")).unwrap();

    let err = desk
        .update_rule(
            &rule.id,
            RulePatch {
                name: Some("renamed".into()),
                conditions: Some(RuleConditions::CountryBlock { countries: set(&["kp"]) }),
                ..RulePatch::default()
            },
        )
        .unwrap_err();
    assert_eq!(invalid_field(err), "conditions.countries");
    assert_eq!(desk.get_rule(&rule.id).unwrap(), rule);
}

/// Listing filters by enabled flag and rule type.
#[test]
fn list_filters() {
    let (desk, _) = build();
    desk.create_rule(amount_rule("on")).unwrap();
    desk.create_rule(amount_rule("off").enabled(false)).unwrap();
    desk.create_rule(NewRule::new(
        "embargo",
        RuleConditions::CountryBlock { countries: set(&["IR"]) },
        Severity::Critical,
    ))
    .unwrap();

    let all = desk.list_rules(&RuleFilter::default()).unwrap();
    assert_eq!(all.len(), 3);

    let disabled = desk
        .list_rules(&RuleFilter { enabled: Some(false), ..RuleFilter::default() })
        .unwrap();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].name, "off");

    let countries = desk
        .list_rules(&RuleFilter { rule_type: Some(RuleType::CountryBlock), ..RuleFilter::default() })
        .unwrap();
    assert_eq!(countries.len(), 1);
    assert_eq!(countries[0].name, "embargo");
}
