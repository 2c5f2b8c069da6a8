//! Velocity aggregator and per-merchant lock tests, run directly against
//! the SQLite-backed transaction history.

use chrono::{DateTime, Duration, TimeZone, Utc};
use riskwatch_core::{
    collaborators::TransactionHistory,
    error::RiskError,
    event::TransactionEvent,
    store::RiskStore,
    velocity::{SubjectLocks, VelocityAggregator},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn history() -> Arc<RiskStore> {
    let store = RiskStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    Arc::new(store)
}

fn record(store: &RiskStore, id: &str, merchant: &str, amount: Decimal, currency: &str, at: DateTime<Utc>) {
    store
        .record(&TransactionEvent {
            transaction_id: id.into(),
            merchant_id:    merchant.into(),
            amount,
            currency:       currency.into(),
            from_address:   None,
            to_address:     None,
            country:        None,
            occurred_at:    at,
        })
        .expect("record");
}

/// The window is `(as_of - window, as_of]`: an event exactly one window
/// old has left it, an event at `as_of` is in it.
#[test]
fn window_is_half_open() {
    let store = history();
    let agg = VelocityAggregator::new(store.clone());
    let as_of = t0() + Duration::hours(1);

    record(&store, "edge", "M1", dec!(1), "USD", t0());
    record(&store, "inside", "M1", dec!(1), "USD", t0() + Duration::milliseconds(1));
    record(&store, "now", "M1", dec!(1), "USD", as_of);
    record(&store, "future", "M1", dec!(1), "USD", as_of + Duration::seconds(1));

    assert_eq!(agg.count_since("M1", Duration::hours(1), as_of).unwrap(), 2);
}

/// Re-recording the same transaction id does not double count.
#[test]
fn recording_is_idempotent_per_transaction() {
    let store = history();
    let agg = VelocityAggregator::new(store.clone());

    record(&store, "T1", "M1", dec!(10), "USD", t0());
    record(&store, "T1", "M1", dec!(10), "USD", t0());

    assert_eq!(agg.count_since("M1", Duration::hours(1), t0()).unwrap(), 1);
    assert_eq!(store.transaction_count().unwrap(), 1);
}

/// Counts and sums never leak across merchants.
#[test]
fn merchants_are_isolated() {
    let store = history();
    let agg = VelocityAggregator::new(store.clone());

    record(&store, "A1", "M1", dec!(100), "USD", t0());
    record(&store, "A2", "M1", dec!(50.50), "USD", t0() + Duration::minutes(1));
    record(&store, "B1", "M2", dec!(999), "USD", t0() + Duration::minutes(1));

    let as_of = t0() + Duration::minutes(5);
    let usd = |txn: &riskwatch_core::collaborators::TransactionRecord| Ok(txn.amount);

    assert_eq!(agg.count_since("M1", Duration::hours(1), as_of).unwrap(), 2);
    assert_eq!(agg.count_since("M2", Duration::hours(1), as_of).unwrap(), 1);
    assert_eq!(agg.count_since("M3", Duration::hours(1), as_of).unwrap(), 0);
    assert_eq!(agg.sum_since("M1", Duration::hours(1), as_of, usd).unwrap(), dec!(150.50));
    assert_eq!(agg.sum_since("M3", Duration::hours(1), as_of, usd).unwrap(), Decimal::ZERO);
}

/// A selector error aborts the whole sum.
#[test]
fn selector_error_aborts_sum() {
    let store = history();
    let agg = VelocityAggregator::new(store.clone());

    record(&store, "A1", "M1", dec!(100), "USD", t0());
    record(&store, "A2", "M1", dec!(100), "JPY", t0());

    let err = agg
        .sum_since("M1", Duration::days(1), t0(), |txn| {
            if txn.currency == "USD" {
                Ok(txn.amount)
            } else {
                Err(RiskError::validation("currency", format!("no rate for {}", txn.currency)))
            }
        })
        .unwrap_err();
    assert!(matches!(err, RiskError::Validation { .. }));
}

/// Work under the same subject never overlaps; the table is empty after.
#[test]
fn subject_locks_serialize_same_subject() {
    let locks = SubjectLocks::new();
    let inside = AtomicUsize::new(0);
    let max_seen = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                locks
                    .with_lock("M1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap();
            });
        }
    });

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(locks.tracked(), 0);
}

/// Different subjects do not block each other.
#[test]
fn subject_locks_allow_other_subjects() {
    let locks = SubjectLocks::new();
    let inner = locks
        .with_lock("M1", || locks.with_lock("M2", || 7).unwrap())
        .unwrap();
    assert_eq!(inner, 7);
    assert_eq!(locks.tracked(), 0);
}
