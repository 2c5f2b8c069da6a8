//! Alert lifecycle manager.
//!
//! Owns the OPEN → RESOLVED state machine. Creation is an upsert on
//! (triggered rule, affected transaction): while an OPEN alert exists for
//! the pair, creating again returns that alert instead of a second one.
//! The partial unique index on `risk_alert` settles concurrent inserts.
//!
//! RULE: every create and resolve appends an audit record. The record is
//! staged on the alert row in the same write as the mutation and cleared
//! once the audit sink accepts it. An audit failure is an error for the
//! caller; the staged record is delivered by the next call that touches
//! the alert (a retried create, or a repeated resolve).

use crate::{
    alert::{
        AlertFilter, AlertStatus, AutoActionTaken, FlaggedMerchant, FlaggedTransaction, NewAlert,
        RiskAlert,
    },
    audit::{AuditAction, AuditRecord},
    clock::Clock,
    collaborators::AuditLog,
    error::{RiskError, RiskResult},
    store::RiskStore,
    types::{new_id, Actor},
};
use std::sync::Arc;

/// Result of an alert upsert.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub alert:   RiskAlert,
    /// False when an OPEN alert for the same rule + transaction already existed.
    pub created: bool,
}

pub struct AlertManager {
    store:                 Arc<RiskStore>,
    audit:                 Arc<dyn AuditLog>,
    clock:                 Arc<dyn Clock>,
    resolution_min_length: usize,
}

impl AlertManager {
    pub fn new(
        store: Arc<RiskStore>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        resolution_min_length: usize,
    ) -> Self {
        Self { store, audit, clock, resolution_min_length }
    }

    pub fn create(&self, spec: NewAlert, actor: &Actor) -> RiskResult<Materialized> {
        self.create_with_action(spec, actor, |_| AutoActionTaken::NoAction)
    }

    /// Upsert an alert. `act` runs only when a new alert was written; its
    /// outcome is stored on the alert before the creation is audited.
    pub fn create_with_action<F>(&self, spec: NewAlert, actor: &Actor, act: F) -> RiskResult<Materialized>
    where
        F: FnOnce(&RiskAlert) -> AutoActionTaken,
    {
        spec.validate()?;

        if let Some(existing) = self.existing_open(&spec)? {
            log::debug!(
                "Alert {} already open for rule {}; not duplicating",
                existing.id, existing.triggered_rule_id
            );
            let alert = self.flush_audit(&existing.id)?;
            return Ok(Materialized { alert, created: false });
        }

        let now = self.clock.now();
        let alert = RiskAlert {
            id:                      new_id(),
            severity:                spec.severity,
            alert_type:              spec.alert_type,
            message:                 spec.message,
            affected_transaction_id: spec.affected_transaction_id,
            affected_merchant_id:    spec.affected_merchant_id,
            triggered_rule_id:       spec.triggered_rule_id,
            status:                  AlertStatus::Open,
            auto_action_taken:       AutoActionTaken::NoAction,
            resolution:              None,
            resolved_by_id:          None,
            resolved_at:             None,
            created_at:              now,
            updated_at:              now,
        };
        // `after` is filled from the stored row when the record is flushed.
        let staged = AuditRecord {
            actor_id:    actor.id.clone(),
            actor_role:  actor.role.clone(),
            action:      AuditAction::AlertCreated,
            resource_id: alert.id.clone(),
            before:      None,
            after:       None,
            timestamp:   now,
        };

        if !self.store.insert_alert_if_absent(&alert, &staged)? {
            // Another evaluation of the same event won the insert.
            let txn = alert.affected_transaction_id.as_deref().unwrap_or_default();
            return match self.store.find_open_alert(&alert.triggered_rule_id, txn)? {
                Some(winner) => Ok(Materialized { alert: winner, created: false }),
                None => Err(RiskError::Conflict(format!(
                    "concurrent alert insert for rule {} and transaction {txn}",
                    alert.triggered_rule_id
                ))),
            };
        }

        let action = act(&alert);
        if action != AutoActionTaken::NoAction {
            self.store.record_auto_action(&alert.id, action, self.clock.now())?;
        }

        let stored = self.flush_audit(&alert.id)?;
        log::info!(
            "Alert created: {} ({}, {}) rule={} txn={} merchant={} action={}",
            stored.id,
            stored.alert_type,
            stored.severity,
            stored.triggered_rule_id,
            stored.affected_transaction_id.as_deref().unwrap_or("-"),
            stored.affected_merchant_id.as_deref().unwrap_or("-"),
            stored.auto_action_taken,
        );
        Ok(Materialized { alert: stored, created: true })
    }

    /// Deliver the alert's staged audit record, if any, with the current
    /// row as its `after` snapshot. Returns the current row.
    fn flush_audit(&self, id: &str) -> RiskResult<RiskAlert> {
        let stored = self.get(id)?;
        if let Some(mut record) = self.store.pending_audit(id)? {
            record.after = Some(serde_json::to_value(&stored)?);
            self.audit.append(&record)?;
            self.store.clear_pending_audit(id)?;
            log::debug!("Audit {} delivered for alert {id}", record.action.as_str());
        }
        Ok(stored)
    }

    fn existing_open(&self, spec: &NewAlert) -> RiskResult<Option<RiskAlert>> {
        match &spec.affected_transaction_id {
            Some(txn) => self.store.find_open_alert(&spec.triggered_rule_id, txn),
            None => Ok(None),
        }
    }

    /// OPEN → RESOLVED. One-way; a second attempt is a `Conflict` and leaves
    /// the first resolution untouched.
    pub fn resolve(&self, id: &str, resolution: &str, actor: &Actor) -> RiskResult<RiskAlert> {
        let resolution = resolution.trim();
        if resolution.chars().count() < self.resolution_min_length {
            return Err(RiskError::validation(
                "resolution",
                format!("must be at least {} characters", self.resolution_min_length),
            ));
        }
        if actor.id.trim().is_empty() {
            return Err(RiskError::validation("resolvedById", "must not be empty"));
        }

        // Delivers any record still staged on the row (a creation, or a
        // resolution whose audit never landed) before a new one replaces it.
        let before = self.flush_audit(id)?;
        if !before.is_open() {
            return Err(RiskError::Conflict(format!("alert {id} is already resolved")));
        }

        let now = self.clock.now();
        let staged = AuditRecord {
            actor_id:    actor.id.clone(),
            actor_role:  actor.role.clone(),
            action:      AuditAction::AlertResolved,
            resource_id: id.to_string(),
            before:      Some(serde_json::to_value(&before)?),
            after:       None,
            timestamp:   now,
        };
        if !self.store.resolve_alert(id, resolution, &actor.id, now, &staged)? {
            return Err(RiskError::Conflict(format!("alert {id} is already resolved")));
        }
        let after = self.flush_audit(id)?;

        log::info!("Alert resolved: {id} by {} ({})", actor.id, actor.role);
        Ok(after)
    }

    pub fn get(&self, id: &str) -> RiskResult<RiskAlert> {
        self.store
            .get_alert(id)?
            .ok_or_else(|| RiskError::not_found("Alert", id))
    }

    pub fn list(&self, filter: &AlertFilter) -> RiskResult<Vec<RiskAlert>> {
        self.store.list_alerts(filter)
    }

    pub fn flagged_transactions(&self) -> RiskResult<Vec<FlaggedTransaction>> {
        self.store.flagged_transactions()
    }

    pub fn flagged_merchants(&self) -> RiskResult<Vec<FlaggedMerchant>> {
        self.store.flagged_merchants()
    }
}
