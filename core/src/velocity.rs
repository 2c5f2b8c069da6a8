//! Velocity aggregator: counts and sums over a merchant's trailing window.
//!
//! Owns no storage. Every call is a range query `(as_of - window, as_of]`
//! against the transaction history, so results survive restarts and are
//! shared by every instance pointing at the same log. Nothing is cached
//! across calls.

use crate::{
    collaborators::{TransactionHistory, TransactionRecord},
    error::{RiskError, RiskResult},
    types::Timestamp,
};
use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct VelocityAggregator {
    history: Arc<dyn TransactionHistory>,
}

impl VelocityAggregator {
    pub fn new(history: Arc<dyn TransactionHistory>) -> Self {
        Self { history }
    }

    pub fn count_since(&self, subject_id: &str, window: Duration, as_of: Timestamp) -> RiskResult<u64> {
        self.history.count_between(subject_id, window_start(window, as_of)?, as_of)
    }

    /// Sum `value_selector` over the window. A selector error aborts the sum.
    pub fn sum_since<F>(
        &self,
        subject_id: &str,
        window: Duration,
        as_of: Timestamp,
        value_selector: F,
    ) -> RiskResult<Decimal>
    where
        F: Fn(&TransactionRecord) -> RiskResult<Decimal>,
    {
        self.history
            .transactions_between(subject_id, window_start(window, as_of)?, as_of)?
            .iter()
            .try_fold(Decimal::ZERO, |acc, txn| {
                acc.checked_add(value_selector(txn)?).ok_or_else(|| {
                    RiskError::validation(
                        "amount",
                        format!("window sum for {subject_id} overflows at transaction {}", txn.transaction_id),
                    )
                })
            })
    }
}

fn window_start(window: Duration, as_of: Timestamp) -> RiskResult<Timestamp> {
    as_of.checked_sub_signed(window).ok_or_else(|| {
        RiskError::validation("window", format!("{}s before {as_of} is out of range", window.num_seconds()))
    })
}

/// Per-subject mutual exclusion.
///
/// Two events for the same merchant evaluated at once can both miss (or
/// both hit) a velocity threshold. Holding the subject's lock across
/// record + evaluate closes that race; different subjects never contend.
#[derive(Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SubjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock<T>(&self, subject_id: &str, f: impl FnOnce() -> T) -> RiskResult<T> {
        let slot = {
            let mut locks = self.locks.lock().map_err(|_| RiskError::LockPoisoned)?;
            Arc::clone(locks.entry(subject_id.to_string()).or_default())
        };

        let result = {
            // The mutex guards no data, so a poisoned slot is still usable.
            let _guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };

        // Drop the slot once nobody else holds or waits on it.
        let mut locks = self.locks.lock().map_err(|_| RiskError::LockPoisoned)?;
        if Arc::strong_count(&slot) == 2 {
            locks.remove(subject_id);
        }
        Ok(result)
    }

    /// Number of subjects currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
