//! Interfaces to the systems around the risk engine, plus the in-memory
//! implementations used by the runner and the test suite.
//!
//! RULE: the engine reaches the outside world only through these traits.
//! The SQLite store implements `TransactionHistory` and `AuditLog`.

use crate::{
    audit::AuditRecord,
    error::{RiskError, RiskResult},
    event::TransactionEvent,
    types::{EntityId, Timestamp},
};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// A transaction as stored in the history log.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: EntityId,
    pub merchant_id:    EntityId,
    pub amount:         Decimal,
    pub currency:       String,
    pub occurred_at:    Timestamp,
}

/// Append-only, queryable transaction history keyed by merchant + time.
pub trait TransactionHistory: Send + Sync {
    /// Durably record an event. Re-recording the same transaction id is a no-op.
    fn record(&self, event: &TransactionEvent) -> RiskResult<()>;

    /// Count of a merchant's transactions with `after < occurred_at <= until`.
    fn count_between(&self, merchant_id: &str, after: Timestamp, until: Timestamp) -> RiskResult<u64>;

    /// A merchant's transactions with `after < occurred_at <= until`.
    fn transactions_between(
        &self,
        merchant_id: &str,
        after: Timestamp,
        until: Timestamp,
    ) -> RiskResult<Vec<TransactionRecord>>;
}

pub trait MerchantDirectory: Send + Sync {
    fn country_of(&self, merchant_id: &str) -> RiskResult<Option<String>>;
    fn suspend(&self, merchant_id: &str, reason: &str) -> RiskResult<()>;
}

pub trait TransactionProcessor: Send + Sync {
    fn reject(&self, transaction_id: &str, reason: &str) -> RiskResult<()>;
}

/// Append-only audit sink. Never read by the engine.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: &AuditRecord) -> RiskResult<()>;
}

pub trait PermissionCheck: Send + Sync {
    fn allows(&self, role: &str, capability: &str) -> bool;
}

// ── In-memory implementations ────────────────────────────────────────────────

/// Merchant registry held in memory. Suspensions are remembered so callers
/// can inspect them; individual merchants can be marked as failing.
#[derive(Debug, Default)]
pub struct InMemoryMerchantDirectory {
    countries: Mutex<HashMap<EntityId, String>>,
    suspended: Mutex<HashSet<EntityId>>,
    failing:   Mutex<HashSet<EntityId>>,
}

impl InMemoryMerchantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merchant(self, merchant_id: &str, country: &str) -> Self {
        self.register(merchant_id, country);
        self
    }

    pub fn register(&self, merchant_id: &str, country: &str) {
        if let Ok(mut countries) = self.countries.lock() {
            countries.insert(merchant_id.to_string(), country.to_string());
        }
    }

    /// Make every `suspend` call for this merchant fail.
    pub fn fail_suspensions_for(&self, merchant_id: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(merchant_id.to_string());
        }
    }

    pub fn is_suspended(&self, merchant_id: &str) -> bool {
        self.suspended.lock().map(|s| s.contains(merchant_id)).unwrap_or(false)
    }
}

impl MerchantDirectory for InMemoryMerchantDirectory {
    fn country_of(&self, merchant_id: &str) -> RiskResult<Option<String>> {
        let countries = self.countries.lock().map_err(|_| RiskError::LockPoisoned)?;
        Ok(countries.get(merchant_id).cloned())
    }

    fn suspend(&self, merchant_id: &str, reason: &str) -> RiskResult<()> {
        let failing = self.failing.lock().map_err(|_| RiskError::LockPoisoned)?;
        if failing.contains(merchant_id) {
            return Err(RiskError::Collaborator {
                collaborator: "merchant directory",
                message: format!("suspension of {merchant_id} refused"),
            });
        }
        drop(failing);
        log::info!("Merchant {merchant_id} suspended: {reason}");
        self.suspended
            .lock()
            .map_err(|_| RiskError::LockPoisoned)?
            .insert(merchant_id.to_string());
        Ok(())
    }
}

/// Transaction processor that records every rejection it performs.
#[derive(Debug, Default)]
pub struct RecordingTransactionProcessor {
    rejected:    Mutex<Vec<EntityId>>,
    unavailable: Mutex<bool>,
}

impl RecordingTransactionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        if let Ok(mut unavailable) = self.unavailable.lock() {
            *unavailable = down;
        }
    }

    pub fn rejected(&self) -> Vec<EntityId> {
        self.rejected.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl TransactionProcessor for RecordingTransactionProcessor {
    fn reject(&self, transaction_id: &str, reason: &str) -> RiskResult<()> {
        if *self.unavailable.lock().map_err(|_| RiskError::LockPoisoned)? {
            return Err(RiskError::Collaborator {
                collaborator: "transaction processor",
                message: "service unavailable".into(),
            });
        }
        log::info!("Transaction {transaction_id} rejected: {reason}");
        self.rejected
            .lock()
            .map_err(|_| RiskError::LockPoisoned)?
            .push(transaction_id.to_string());
        Ok(())
    }
}

/// Role → capability table, usually built from `RiskConfig::permissions`.
#[derive(Debug, Clone, Default)]
pub struct RolePermissions {
    grants: HashMap<String, HashSet<String>>,
}

impl RolePermissions {
    pub fn from_config(table: &HashMap<String, Vec<String>>) -> Self {
        let grants = table
            .iter()
            .map(|(role, caps)| (role.clone(), caps.iter().cloned().collect()))
            .collect();
        Self { grants }
    }
}

impl PermissionCheck for RolePermissions {
    fn allows(&self, role: &str, capability: &str) -> bool {
        self.grants.get(role).is_some_and(|caps| caps.contains(capability))
    }
}
