//! Risk alert queries.

use super::{parse_col, RiskStore};
use crate::{
    alert::{
        AlertFilter, AlertStatus, AutoActionTaken, FlaggedMerchant, FlaggedTransaction, RiskAlert,
    },
    audit::AuditRecord,
    error::RiskResult,
    rule::Severity,
    types::{from_millis, to_millis, Timestamp},
};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};

const ALERT_COLUMNS: &str = "id, severity, alert_type, message, affected_transaction_id,
     affected_merchant_id, triggered_rule_id, status, auto_action_taken, resolution,
     resolved_by_id, resolved_at, created_at, updated_at";

fn severity_rank(severity: Severity) -> i64 {
    match severity {
        Severity::Low      => 0,
        Severity::Medium   => 1,
        Severity::High     => 2,
        Severity::Critical => 3,
    }
}

fn severity_from_rank(rank: i64) -> Severity {
    match rank {
        i64::MIN..=0 => Severity::Low,
        1            => Severity::Medium,
        2            => Severity::High,
        _            => Severity::Critical,
    }
}

struct AlertRow {
    id:                      String,
    severity:                String,
    alert_type:              String,
    message:                 String,
    affected_transaction_id: Option<String>,
    affected_merchant_id:    Option<String>,
    triggered_rule_id:       String,
    status:                  String,
    auto_action_taken:       String,
    resolution:              Option<String>,
    resolved_by_id:          Option<String>,
    resolved_at:             Option<i64>,
    created_at:              i64,
    updated_at:              i64,
}

impl AlertRow {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id:                      r.get(0)?,
            severity:                r.get(1)?,
            alert_type:              r.get(2)?,
            message:                 r.get(3)?,
            affected_transaction_id: r.get(4)?,
            affected_merchant_id:    r.get(5)?,
            triggered_rule_id:       r.get(6)?,
            status:                  r.get(7)?,
            auto_action_taken:       r.get(8)?,
            resolution:              r.get(9)?,
            resolved_by_id:          r.get(10)?,
            resolved_at:             r.get(11)?,
            created_at:              r.get(12)?,
            updated_at:              r.get(13)?,
        })
    }

    fn into_alert(self) -> RiskResult<RiskAlert> {
        Ok(RiskAlert {
            severity: parse_col("severity", &self.severity, |s| s.parse::<Severity>())?,
            status: parse_col("status", &self.status, |s| s.parse::<AlertStatus>())?,
            auto_action_taken: parse_col("auto_action_taken", &self.auto_action_taken, |s| {
                s.parse::<AutoActionTaken>()
            })?,
            id: self.id,
            alert_type: self.alert_type,
            message: self.message,
            affected_transaction_id: self.affected_transaction_id,
            affected_merchant_id: self.affected_merchant_id,
            triggered_rule_id: self.triggered_rule_id,
            resolution: self.resolution,
            resolved_by_id: self.resolved_by_id,
            resolved_at: self.resolved_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

impl RiskStore {
    /// Insert unless an OPEN alert already exists for the same
    /// (rule, transaction). Returns whether a row was written. `staged` is
    /// stored with the row until `clear_pending_audit`.
    pub fn insert_alert_if_absent(&self, alert: &RiskAlert, staged: &AuditRecord) -> RiskResult<bool> {
        let staged = serde_json::to_string(staged)?;
        let inserted = self.conn()?.execute(
            "INSERT INTO risk_alert (
                id, severity, severity_rank, alert_type, message, affected_transaction_id,
                affected_merchant_id, triggered_rule_id, status, auto_action_taken,
                resolution, resolved_by_id, resolved_at, created_at, updated_at, pending_audit
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT DO NOTHING",
            params![
                &alert.id,
                alert.severity.as_str(),
                severity_rank(alert.severity),
                &alert.alert_type,
                &alert.message,
                &alert.affected_transaction_id,
                &alert.affected_merchant_id,
                &alert.triggered_rule_id,
                alert.status.as_str(),
                alert.auto_action_taken.as_str(),
                &alert.resolution,
                &alert.resolved_by_id,
                alert.resolved_at.map(to_millis),
                to_millis(alert.created_at),
                to_millis(alert.updated_at),
                staged,
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Audit record written alongside the last mutation and not yet
    /// accepted by the audit sink.
    pub fn pending_audit(&self, id: &str) -> RiskResult<Option<AuditRecord>> {
        let raw: Option<Option<String>> = self
            .conn()?
            .query_row("SELECT pending_audit FROM risk_alert WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        match raw.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn clear_pending_audit(&self, id: &str) -> RiskResult<()> {
        self.conn()?.execute(
            "UPDATE risk_alert SET pending_audit = NULL WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn get_alert(&self, id: &str) -> RiskResult<Option<RiskAlert>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM risk_alert WHERE id = ?1");
        let row = self
            .conn()?
            .query_row(&sql, params![id], AlertRow::from_row)
            .optional()?;
        row.map(AlertRow::into_alert).transpose()
    }

    pub fn find_open_alert(&self, rule_id: &str, transaction_id: &str) -> RiskResult<Option<RiskAlert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM risk_alert
             WHERE triggered_rule_id = ?1 AND affected_transaction_id = ?2 AND status = 'OPEN'"
        );
        let row = self
            .conn()?
            .query_row(&sql, params![rule_id, transaction_id], AlertRow::from_row)
            .optional()?;
        row.map(AlertRow::into_alert).transpose()
    }

    /// Newest first.
    pub fn list_alerts(&self, filter: &AlertFilter) -> RiskResult<Vec<RiskAlert>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().into()));
        }
        if let Some(floor) = filter.min_severity {
            clauses.push("severity_rank >= ?");
            values.push(Value::Integer(severity_rank(floor)));
        }
        if let Some(merchant_id) = &filter.merchant_id {
            clauses.push("affected_merchant_id = ?");
            values.push(Value::Text(merchant_id.clone()));
        }
        if let Some(transaction_id) = &filter.transaction_id {
            clauses.push("affected_transaction_id = ?");
            values.push(Value::Text(transaction_id.clone()));
        }
        if let Some(rule_id) = &filter.rule_id {
            clauses.push("triggered_rule_id = ?");
            values.push(Value::Text(rule_id.clone()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM risk_alert {where_sql}
             ORDER BY created_at DESC, id ASC"
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), AlertRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// OPEN → RESOLVED in one statement, staging its audit record in the
    /// same write. Returns false if the alert was not OPEN (missing or
    /// already resolved).
    pub fn resolve_alert(
        &self,
        id: &str,
        resolution: &str,
        resolved_by_id: &str,
        at: Timestamp,
        staged: &AuditRecord,
    ) -> RiskResult<bool> {
        let staged = serde_json::to_string(staged)?;
        let changed = self.conn()?.execute(
            "UPDATE risk_alert
             SET status = 'RESOLVED', resolution = ?2, resolved_by_id = ?3,
                 resolved_at = ?4, updated_at = ?4, pending_audit = ?5
             WHERE id = ?1 AND status = 'OPEN'",
            params![id, resolution, resolved_by_id, to_millis(at), staged],
        )?;
        Ok(changed == 1)
    }

    /// Record the auto-action outcome. Only the first recording sticks.
    pub fn record_auto_action(&self, id: &str, action: AutoActionTaken, at: Timestamp) -> RiskResult<bool> {
        let changed = self.conn()?.execute(
            "UPDATE risk_alert SET auto_action_taken = ?2, updated_at = ?3
             WHERE id = ?1 AND auto_action_taken = 'NO_ACTION'",
            params![id, action.as_str(), to_millis(at)],
        )?;
        Ok(changed == 1)
    }

    /// Alerts that reference a transaction, newest first.
    pub fn flagged_transactions(&self) -> RiskResult<Vec<FlaggedTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT affected_transaction_id, id, severity, triggered_rule_id,
                    alert_type, message, created_at
             FROM risk_alert
             WHERE affected_transaction_id IS NOT NULL
             ORDER BY created_at DESC, id ASC",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, i64>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(transaction_id, alert_id, severity, rule_id, alert_type, message, created_at)| {
                Ok(FlaggedTransaction {
                    transaction_id,
                    alert_id,
                    severity: parse_col("severity", &severity, |s| s.parse::<Severity>())?,
                    triggered_rule_id: rule_id,
                    alert_type,
                    message,
                    created_at: from_millis(created_at),
                })
            })
            .collect()
    }

    /// Per-merchant alert count and worst severity, most-alerted first.
    pub fn flagged_merchants(&self) -> RiskResult<Vec<FlaggedMerchant>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT affected_merchant_id, COUNT(id) AS alert_count, MAX(severity_rank)
             FROM risk_alert
             WHERE affected_merchant_id IS NOT NULL
             GROUP BY affected_merchant_id
             ORDER BY alert_count DESC, affected_merchant_id ASC",
        )?;
        let merchants = stmt
            .query_map([], |r| {
                Ok(FlaggedMerchant {
                    merchant_id:  r.get(0)?,
                    alert_count:  r.get::<_, i64>(1)? as u64,
                    max_severity: severity_from_rank(r.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(merchants)
    }

    pub fn alert_count(&self) -> RiskResult<i64> {
        Ok(self
            .conn()?
            .query_row("SELECT COUNT(*) FROM risk_alert", [], |r| r.get(0))?)
    }
}
