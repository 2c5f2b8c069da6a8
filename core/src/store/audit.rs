//! Audit log persistence.

use super::RiskStore;
use crate::{
    audit::AuditRecord,
    collaborators::AuditLog,
    error::RiskResult,
    types::to_millis,
};
use rusqlite::params;

impl AuditLog for RiskStore {
    fn append(&self, record: &AuditRecord) -> RiskResult<()> {
        let before = record.before.as_ref().map(serde_json::to_string).transpose()?;
        let after = record.after.as_ref().map(serde_json::to_string).transpose()?;
        self.conn()?.execute(
            "INSERT INTO audit_log (actor_id, actor_role, action, resource_id,
                before_json, after_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &record.actor_id,
                &record.actor_role,
                record.action.as_str(),
                &record.resource_id,
                before,
                after,
                to_millis(record.timestamp),
            ],
        )?;
        Ok(())
    }
}

/// Audit row as read back by tooling and tests.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id:    String,
    pub actor_role:  String,
    pub action:      String,
    pub before_json: Option<String>,
    pub after_json:  Option<String>,
}

impl RiskStore {
    /// Audit entries for one resource, oldest first.
    pub fn audit_entries_for(&self, resource_id: &str) -> RiskResult<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT actor_id, actor_role, action, before_json, after_json
             FROM audit_log WHERE resource_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![resource_id], |r| {
                Ok(AuditEntry {
                    actor_id:    r.get(0)?,
                    actor_role:  r.get(1)?,
                    action:      r.get(2)?,
                    before_json: r.get(3)?,
                    after_json:  r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
