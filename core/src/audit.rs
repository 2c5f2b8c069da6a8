//! Audit trail records for alert mutations.

use crate::types::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AlertCreated,
    AlertResolved,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlertCreated  => "alert_created",
            Self::AlertResolved => "alert_resolved",
        }
    }
}

/// One append-only audit entry. `before`/`after` are JSON snapshots of the
/// resource; `before` is `None` on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor_id:    String,
    pub actor_role:  String,
    pub action:      AuditAction,
    pub resource_id: EntityId,
    pub before:      Option<serde_json::Value>,
    pub after:       Option<serde_json::Value>,
    pub timestamp:   Timestamp,
}
