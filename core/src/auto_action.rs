//! Auto-action executor.
//!
//! Decides which mitigation a triggered auto-block rule gets (from the
//! configured policy table) and performs it through the merchant directory
//! or transaction processor. Best-effort: a collaborator failure is logged
//! and reported as `NoAction`, never returned as an error.

use crate::{
    alert::AutoActionTaken,
    collaborators::{MerchantDirectory, TransactionProcessor},
    config::{ActionKind, AutoActionPolicy},
    rule::{RuleType, Severity},
};
use std::sync::Arc;

/// Everything the executor needs to know about one triggered rule.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rule_id:        &'a str,
    pub rule_type:      RuleType,
    pub severity:       Severity,
    pub merchant_id:    Option<&'a str>,
    pub transaction_id: Option<&'a str>,
}

pub struct AutoActionExecutor {
    policy:    AutoActionPolicy,
    merchants: Arc<dyn MerchantDirectory>,
    processor: Arc<dyn TransactionProcessor>,
}

impl AutoActionExecutor {
    pub fn new(
        policy: AutoActionPolicy,
        merchants: Arc<dyn MerchantDirectory>,
        processor: Arc<dyn TransactionProcessor>,
    ) -> Self {
        Self { policy, merchants, processor }
    }

    pub fn decide(&self, rule_type: RuleType, severity: Severity) -> ActionKind {
        self.policy.decide(rule_type, severity)
    }

    /// Perform the policy's action. Returns what was actually accomplished.
    pub fn execute(&self, ctx: ActionContext<'_>) -> AutoActionTaken {
        let action = self.decide(ctx.rule_type, ctx.severity);
        let reason = format!("risk rule {} ({}, {})", ctx.rule_id, ctx.rule_type, ctx.severity);

        match action {
            ActionKind::RejectTransaction => {
                let Some(transaction_id) = ctx.transaction_id else {
                    log::warn!("Auto-action for rule {}: no transaction to reject", ctx.rule_id);
                    return AutoActionTaken::NoAction;
                };
                match self.processor.reject(transaction_id, &reason) {
                    Ok(()) => AutoActionTaken::RejectedTransaction,
                    Err(e) => {
                        log::error!(
                            "Auto-action for rule {}: rejecting transaction {transaction_id} failed: {e}",
                            ctx.rule_id
                        );
                        AutoActionTaken::NoAction
                    }
                }
            }
            ActionKind::SuspendMerchant => {
                let Some(merchant_id) = ctx.merchant_id else {
                    log::warn!("Auto-action for rule {}: no merchant to suspend", ctx.rule_id);
                    return AutoActionTaken::NoAction;
                };
                match self.merchants.suspend(merchant_id, &reason) {
                    Ok(()) => AutoActionTaken::SuspendedMerchant,
                    Err(e) => {
                        log::error!(
                            "Auto-action for rule {}: suspending merchant {merchant_id} failed: {e}",
                            ctx.rule_id
                        );
                        AutoActionTaken::NoAction
                    }
                }
            }
        }
    }
}
