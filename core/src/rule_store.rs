//! Rule store: validated lifecycle for risk rules.
//!
//! Writes validate conditions against the rule type before anything hits
//! SQLite. Reads never return soft-deleted rules unless the filter asks.

use crate::{
    clock::Clock,
    error::{RiskError, RiskResult},
    rule::{NewRule, RiskRule, RuleFilter, RulePatch, RuleType},
    store::RiskStore,
    types::new_id,
};
use std::sync::Arc;

pub struct RuleStore {
    store: Arc<RiskStore>,
    clock: Arc<dyn Clock>,
}

impl RuleStore {
    pub fn new(store: Arc<RiskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(&self, mut spec: NewRule) -> RiskResult<RiskRule> {
        spec.validate()?;
        spec.conditions.normalize();
        let now = self.clock.now();
        let rule = RiskRule {
            id:            new_id(),
            name:          spec.name.trim().to_string(),
            description:   spec.description,
            rule_type:     spec.conditions.rule_type(),
            conditions:    spec.conditions,
            severity:      spec.severity,
            is_enabled:    spec.is_enabled,
            auto_block:    spec.auto_block,
            created_by_id: spec.created_by_id,
            created_at:    now,
            updated_at:    now,
            deleted_at:    None,
        };
        self.store.insert_rule(&rule)?;
        log::info!(
            "Rule created: {} '{}' ({}, {}, enabled={}, autoBlock={})",
            rule.id, rule.name, rule.rule_type, rule.severity, rule.is_enabled, rule.auto_block
        );
        // Read back so timestamps carry stored (millisecond) precision.
        self.get(&rule.id)
    }

    /// Live rule by id. Soft-deleted rules are `NotFound`.
    pub fn get(&self, id: &str) -> RiskResult<RiskRule> {
        self.store
            .get_rule(id, false)?
            .ok_or_else(|| RiskError::not_found("Rule", id))
    }

    pub fn list(&self, filter: &RuleFilter) -> RiskResult<Vec<RiskRule>> {
        self.store.list_rules(filter)
    }

    pub fn update(&self, id: &str, patch: RulePatch) -> RiskResult<RiskRule> {
        patch.validate()?;
        let mut rule = self.get(id)?;
        patch.apply_to(&mut rule);
        rule.name = rule.name.trim().to_string();
        rule.conditions.normalize();
        rule.updated_at = self.clock.now();

        // Deleted between the read and the write.
        if !self.store.update_rule(&rule)? {
            return Err(RiskError::not_found("Rule", id));
        }
        log::info!("Rule updated: {} '{}'", rule.id, rule.name);
        self.get(id)
    }

    pub fn soft_delete(&self, id: &str) -> RiskResult<()> {
        if !self.store.soft_delete_rule(id, self.clock.now())? {
            return Err(RiskError::not_found("Rule", id));
        }
        log::info!("Rule soft-deleted: {id}");
        Ok(())
    }

    /// Hot path for evaluation: live, enabled rules of one type.
    pub fn list_enabled_by_type(&self, rule_type: RuleType) -> RiskResult<Vec<RiskRule>> {
        self.store.list_enabled_rules_by_type(rule_type)
    }
}
