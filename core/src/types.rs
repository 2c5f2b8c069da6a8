//! Shared primitive types used across the risk engine.

use chrono::{DateTime, Utc};

/// Wall-clock instant. Always UTC.
pub type Timestamp = DateTime<Utc>;

/// A stable, unique identifier for any stored entity (rule, alert, transaction, merchant).
pub type EntityId = String;

/// Identity of whoever performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id:   String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { id: id.into(), role: role.into() }
    }

    /// The engine itself, used for alerts raised during evaluation.
    pub fn system() -> Self {
        Self::new("system", "SYSTEM")
    }
}

/// Generate a fresh opaque identifier.
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Timestamp {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
