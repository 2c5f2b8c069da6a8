//! RiskDesk: the public surface of the risk engine.
//!
//! Thin. Wires the store, configuration and collaborators into the rule
//! store, alert manager and evaluation service, then delegates. Permission
//! checks are the caller's job; `authorize` is offered for callers that
//! want the engine's capability table.

use crate::{
    alert::{AlertFilter, FlaggedMerchant, FlaggedTransaction, NewAlert, RiskAlert},
    alert_lifecycle::AlertManager,
    auto_action::AutoActionExecutor,
    clock::Clock,
    collaborators::{
        AuditLog, MerchantDirectory, PermissionCheck, RolePermissions, TransactionHistory,
        TransactionProcessor,
    },
    config::RiskConfig,
    error::{RiskError, RiskResult},
    evaluation::RuleEvaluationService,
    event::{RuleEvaluationResult, TransactionEvent},
    rule::{NewRule, RiskRule, RuleFilter, RulePatch, Severity},
    rule_store::RuleStore,
    store::RiskStore,
    types::Actor,
};
use std::sync::Arc;

/// Capability strings checked by `RiskDesk::authorize`.
pub mod capability {
    pub const RULES_READ:     &str = "risk:rules:read";
    pub const RULES_WRITE:    &str = "risk:rules:write";
    pub const ALERTS_READ:    &str = "risk:alerts:read";
    pub const ALERTS_RESOLVE: &str = "risk:alerts:resolve";
}

/// Everything outside the engine that the desk talks to.
pub struct Collaborators {
    pub history:     Arc<dyn TransactionHistory>,
    pub audit:       Arc<dyn AuditLog>,
    pub merchants:   Arc<dyn MerchantDirectory>,
    pub processor:   Arc<dyn TransactionProcessor>,
    pub permissions: Arc<dyn PermissionCheck>,
    pub clock:       Arc<dyn Clock>,
}

impl Collaborators {
    /// History and audit go to the store; permissions come from config.
    pub fn backed_by(
        store: &Arc<RiskStore>,
        config: &RiskConfig,
        merchants: Arc<dyn MerchantDirectory>,
        processor: Arc<dyn TransactionProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            history: Arc::clone(store) as Arc<dyn TransactionHistory>,
            audit: Arc::clone(store) as Arc<dyn AuditLog>,
            merchants,
            processor,
            permissions: Arc::new(RolePermissions::from_config(&config.permissions)),
            clock,
        }
    }
}

pub struct RiskDesk {
    store:       Arc<RiskStore>,
    config:      RiskConfig,
    rules:       Arc<RuleStore>,
    alerts:      Arc<AlertManager>,
    evaluator:   RuleEvaluationService,
    permissions: Arc<dyn PermissionCheck>,
}

impl RiskDesk {
    pub fn new(store: Arc<RiskStore>, config: RiskConfig, parts: Collaborators) -> Self {
        let rules = Arc::new(RuleStore::new(Arc::clone(&store), Arc::clone(&parts.clock)));
        let alerts = Arc::new(AlertManager::new(
            Arc::clone(&store),
            parts.audit,
            Arc::clone(&parts.clock),
            config.resolution_min_length,
        ));
        let executor = AutoActionExecutor::new(
            config.auto_action_policy.clone(),
            Arc::clone(&parts.merchants),
            parts.processor,
        );
        let evaluator = RuleEvaluationService::new(
            Arc::clone(&rules),
            Arc::clone(&alerts),
            parts.history,
            parts.merchants,
            executor,
            &config,
        );
        Self {
            store,
            config,
            rules,
            alerts,
            evaluator,
            permissions: parts.permissions,
        }
    }

    /// Fresh in-memory, migrated store with store-backed history and audit.
    pub fn in_memory(
        config: RiskConfig,
        merchants: Arc<dyn MerchantDirectory>,
        processor: Arc<dyn TransactionProcessor>,
        clock: Arc<dyn Clock>,
    ) -> RiskResult<Self> {
        let store = Arc::new(RiskStore::in_memory()?);
        store.migrate()?;
        let parts = Collaborators::backed_by(&store, &config, merchants, processor, clock);
        Ok(Self::new(store, config, parts))
    }

    pub fn store(&self) -> &RiskStore {
        &self.store
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    pub fn authorize(&self, actor: &Actor, capability: &str) -> RiskResult<()> {
        if self.permissions.allows(&actor.role, capability) {
            Ok(())
        } else {
            log::warn!("Denied {capability} to {} ({})", actor.id, actor.role);
            Err(RiskError::Forbidden {
                role:       actor.role.clone(),
                capability: capability.to_string(),
            })
        }
    }

    // ── Rules ────────────────────────────────────────────────────────────────

    pub fn create_rule(&self, spec: NewRule) -> RiskResult<RiskRule> {
        self.rules.create(spec)
    }

    pub fn get_rule(&self, id: &str) -> RiskResult<RiskRule> {
        self.rules.get(id)
    }

    pub fn update_rule(&self, id: &str, patch: RulePatch) -> RiskResult<RiskRule> {
        self.rules.update(id, patch)
    }

    /// Soft delete.
    pub fn delete_rule(&self, id: &str) -> RiskResult<()> {
        self.rules.soft_delete(id)
    }

    pub fn list_rules(&self, filter: &RuleFilter) -> RiskResult<Vec<RiskRule>> {
        self.rules.list(filter)
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    pub fn evaluate_transaction_event(
        &self,
        event: &TransactionEvent,
    ) -> RiskResult<Vec<RuleEvaluationResult>> {
        self.evaluator.evaluate_transaction_event(event)
    }

    // ── Alerts ───────────────────────────────────────────────────────────────

    pub fn create_alert(
        &self,
        rule_id: &str,
        severity: Severity,
        alert_type: &str,
        message: &str,
        transaction_id: Option<&str>,
        merchant_id: Option<&str>,
    ) -> RiskResult<RiskAlert> {
        self.evaluator.create_alert(NewAlert {
            triggered_rule_id:       rule_id.to_string(),
            severity,
            alert_type:              alert_type.to_string(),
            message:                 message.to_string(),
            affected_transaction_id: transaction_id.map(str::to_string),
            affected_merchant_id:    merchant_id.map(str::to_string),
        })
    }

    pub fn get_alert(&self, id: &str) -> RiskResult<RiskAlert> {
        self.alerts.get(id)
    }

    /// Lists OPEN alerts unless the filter says otherwise.
    pub fn list_alerts(&self, filter: &AlertFilter) -> RiskResult<Vec<RiskAlert>> {
        self.alerts.list(filter)
    }

    pub fn resolve_alert(&self, id: &str, resolution: &str, actor: &Actor) -> RiskResult<RiskAlert> {
        self.alerts.resolve(id, resolution, actor)
    }

    pub fn flagged_transactions(&self) -> RiskResult<Vec<FlaggedTransaction>> {
        self.alerts.flagged_transactions()
    }

    pub fn flagged_merchants(&self) -> RiskResult<Vec<FlaggedMerchant>> {
        self.alerts.flagged_merchants()
    }
}
