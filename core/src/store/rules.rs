//! Risk rule queries.

use super::{parse_col, RiskStore};
use crate::{
    error::RiskResult,
    rule::{RiskRule, RuleConditions, RuleFilter, RuleType, Severity},
    types::{from_millis, to_millis, Timestamp},
};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension, Row};

const RULE_COLUMNS: &str = "id, name, description, rule_type, conditions, severity,
     is_enabled, auto_block, created_by_id, created_at, updated_at, deleted_at";

/// Raw `risk_rule` row before domain decoding.
struct RuleRow {
    id:            String,
    name:          String,
    description:   String,
    rule_type:     String,
    conditions:    String,
    severity:      String,
    is_enabled:    bool,
    auto_block:    bool,
    created_by_id: Option<String>,
    created_at:    i64,
    updated_at:    i64,
    deleted_at:    Option<i64>,
}

impl RuleRow {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id:            r.get(0)?,
            name:          r.get(1)?,
            description:   r.get(2)?,
            rule_type:     r.get(3)?,
            conditions:    r.get(4)?,
            severity:      r.get(5)?,
            is_enabled:    r.get::<_, i32>(6)? != 0,
            auto_block:    r.get::<_, i32>(7)? != 0,
            created_by_id: r.get(8)?,
            created_at:    r.get(9)?,
            updated_at:    r.get(10)?,
            deleted_at:    r.get(11)?,
        })
    }

    fn into_rule(self) -> RiskResult<RiskRule> {
        let rule_type: RuleType = parse_col("rule_type", &self.rule_type, |s| s.parse::<RuleType>())?;
        let conditions: RuleConditions =
            parse_col("conditions", &self.conditions, |s| serde_json::from_str::<RuleConditions>(s))?;
        let severity: Severity = parse_col("severity", &self.severity, |s| s.parse::<Severity>())?;
        Ok(RiskRule {
            id: self.id,
            name: self.name,
            description: self.description,
            rule_type,
            conditions,
            severity,
            is_enabled: self.is_enabled,
            auto_block: self.auto_block,
            created_by_id: self.created_by_id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            deleted_at: self.deleted_at.map(from_millis),
        })
    }
}

impl RiskStore {
    pub fn insert_rule(&self, rule: &RiskRule) -> RiskResult<()> {
        let conditions = serde_json::to_string(&rule.conditions)?;
        self.conn()?.execute(
            "INSERT INTO risk_rule (
                id, name, description, rule_type, conditions, severity,
                is_enabled, auto_block, created_by_id, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &rule.id,
                &rule.name,
                &rule.description,
                rule.rule_type.as_str(),
                conditions,
                rule.severity.as_str(),
                rule.is_enabled as i32,
                rule.auto_block as i32,
                &rule.created_by_id,
                to_millis(rule.created_at),
                to_millis(rule.updated_at),
                rule.deleted_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    pub fn get_rule(&self, id: &str, include_deleted: bool) -> RiskResult<Option<RiskRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM risk_rule
             WHERE id = ?1 AND (?2 OR deleted_at IS NULL)"
        );
        let row = self
            .conn()?
            .query_row(&sql, params![id, include_deleted], RuleRow::from_row)
            .optional()?;
        row.map(RuleRow::into_rule).transpose()
    }

    /// Newest first. Soft-deleted rules are excluded unless asked for.
    pub fn list_rules(&self, filter: &RuleFilter) -> RiskResult<Vec<RiskRule>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !filter.include_deleted {
            clauses.push("deleted_at IS NULL");
        }
        if let Some(enabled) = filter.enabled {
            clauses.push("is_enabled = ?");
            values.push(Value::Integer(enabled as i64));
        }
        if let Some(rule_type) = filter.rule_type {
            clauses.push("rule_type = ?");
            values.push(Value::Text(rule_type.as_str().to_string()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM risk_rule {where_sql}
             ORDER BY created_at DESC, id ASC"
        );
        self.query_rules(&sql, values)
    }

    /// Live, enabled rules of one type. Served by idx_risk_rule_type_enabled.
    pub fn list_enabled_rules_by_type(&self, rule_type: RuleType) -> RiskResult<Vec<RiskRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM risk_rule
             WHERE rule_type = ? AND is_enabled = 1 AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC"
        );
        self.query_rules(&sql, vec![Value::Text(rule_type.as_str().to_string())])
    }

    /// Overwrite a live rule. Returns false if it does not exist or is deleted.
    pub fn update_rule(&self, rule: &RiskRule) -> RiskResult<bool> {
        let conditions = serde_json::to_string(&rule.conditions)?;
        let changed = self.conn()?.execute(
            "UPDATE risk_rule SET
                name = ?2, description = ?3, rule_type = ?4, conditions = ?5,
                severity = ?6, is_enabled = ?7, auto_block = ?8, updated_at = ?9
             WHERE id = ?1 AND deleted_at IS NULL",
            params![
                &rule.id,
                &rule.name,
                &rule.description,
                rule.rule_type.as_str(),
                conditions,
                rule.severity.as_str(),
                rule.is_enabled as i32,
                rule.auto_block as i32,
                to_millis(rule.updated_at),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Set the delete marker. Returns false if the rule is missing or already deleted.
    pub fn soft_delete_rule(&self, id: &str, at: Timestamp) -> RiskResult<bool> {
        let changed = self.conn()?.execute(
            "UPDATE risk_rule SET deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, to_millis(at)],
        )?;
        Ok(changed == 1)
    }

    fn query_rules(&self, sql: &str, values: Vec<Value>) -> RiskResult<Vec<RiskRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), RuleRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RuleRow::into_rule).collect()
    }
}
