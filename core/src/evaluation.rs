//! Rule evaluation service.
//!
//! Per transaction event:
//!   1. Record the event in the history log (read-your-writes for windows).
//!   2. Load enabled rules for every rule type relevant to the event kind.
//!   3. Evaluate each rule in isolation against the event.
//!   4. Upsert an alert for every triggered rule; run the auto-action for
//!      newly created alerts of auto-block rules.
//!
//! RULE: one rule's failure (bad rate, failed aggregate, panic, budget
//! exhausted) becomes a non-triggered result for that rule only. The
//! remaining rules still run. Storage errors while materializing alerts do
//! propagate; replaying the event is safe because alert creation is an
//! upsert and recording is keyed by transaction id.

use crate::{
    alert::{AutoActionTaken, NewAlert, RiskAlert},
    alert_lifecycle::AlertManager,
    auto_action::{ActionContext, AutoActionExecutor},
    collaborators::{MerchantDirectory, TransactionHistory},
    condition::{self, ConditionContext, ConditionOutcome, EvaluationError},
    config::{ConversionError, CurrencyTable, RiskConfig},
    error::{RiskError, RiskResult},
    event::{relevant_rule_types, RuleEvaluationResult, TransactionEvent},
    rule::{RiskRule, RuleConditions, RuleType},
    rule_store::RuleStore,
    types::Actor,
    velocity::{SubjectLocks, VelocityAggregator},
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct RuleEvaluationService {
    rules:     Arc<RuleStore>,
    alerts:    Arc<AlertManager>,
    history:   Arc<dyn TransactionHistory>,
    velocity:  VelocityAggregator,
    merchants: Arc<dyn MerchantDirectory>,
    executor:  AutoActionExecutor,
    rates:     CurrencyTable,
    locks:     SubjectLocks,
    serialize: bool,
    timeout:   Duration,
}

impl RuleEvaluationService {
    pub fn new(
        rules: Arc<RuleStore>,
        alerts: Arc<AlertManager>,
        history: Arc<dyn TransactionHistory>,
        merchants: Arc<dyn MerchantDirectory>,
        executor: AutoActionExecutor,
        config: &RiskConfig,
    ) -> Self {
        Self {
            rules,
            alerts,
            velocity: VelocityAggregator::new(Arc::clone(&history)),
            history,
            merchants,
            executor,
            rates: config.currency_rates.clone(),
            locks: SubjectLocks::new(),
            serialize: config.serialize_per_merchant,
            timeout: config.evaluation_timeout(),
        }
    }

    /// Evaluate one transaction against every enabled rule. Returns one
    /// result per rule, triggered or not.
    pub fn evaluate_transaction_event(
        &self,
        event: &TransactionEvent,
    ) -> RiskResult<Vec<RuleEvaluationResult>> {
        validate_event(event)?;
        if self.serialize {
            self.locks
                .with_lock(&event.merchant_id, || self.evaluate_unlocked(event))?
        } else {
            self.evaluate_unlocked(event)
        }
    }

    /// System-originated alert that bypasses rule evaluation. Still an
    /// upsert on (rule, transaction).
    pub fn create_alert(&self, spec: NewAlert) -> RiskResult<RiskAlert> {
        Ok(self.alerts.create(spec, &Actor::system())?.alert)
    }

    fn evaluate_unlocked(&self, event: &TransactionEvent) -> RiskResult<Vec<RuleEvaluationResult>> {
        self.history.record(event)?;
        let deadline = Instant::now() + self.timeout;

        let mut rules = Vec::new();
        for rule_type in relevant_rule_types(event.kind()) {
            rules.extend(self.rules.list_enabled_by_type(*rule_type)?);
        }

        let country = if rules.iter().any(|r| r.rule_type == RuleType::CountryBlock) {
            self.merchant_country(event)
        } else {
            Ok(None)
        };

        let mut results = Vec::with_capacity(rules.len());
        for rule in &rules {
            let outcome = if Instant::now() >= deadline {
                Err(EvaluationError::TimedOut)
            } else {
                self.evaluate_rule(rule, event, &country)
            };

            let result = match outcome {
                Ok(outcome) => {
                    if outcome.triggered {
                        self.materialize(rule, event, &outcome.message)?;
                    }
                    RuleEvaluationResult {
                        rule_id:   rule.id.clone(),
                        rule_name: rule.name.clone(),
                        triggered: outcome.triggered,
                        severity:  rule.severity,
                        message:   outcome.message,
                    }
                }
                Err(err) => {
                    log::warn!(
                        "Rule {} '{}' failed for transaction {}: {err}",
                        rule.id, rule.name, event.transaction_id
                    );
                    failure_result(rule, &err)
                }
            };
            results.push(result);
        }

        log::debug!(
            "Transaction {} evaluated against {} rules: {} triggered",
            event.transaction_id,
            results.len(),
            results.iter().filter(|r| r.triggered).count()
        );
        Ok(results)
    }

    /// One rule, isolated: a panic anywhere in aggregation or condition
    /// evaluation fails this rule only.
    fn evaluate_rule(
        &self,
        rule: &RiskRule,
        event: &TransactionEvent,
        country: &Result<Option<String>, EvaluationError>,
    ) -> Result<ConditionOutcome, EvaluationError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.evaluate_rule_inner(rule, event, country)))
            .unwrap_or_else(|payload| Err(EvaluationError::Panicked(panic_message(payload.as_ref()))))
    }

    fn evaluate_rule_inner(
        &self,
        rule: &RiskRule,
        event: &TransactionEvent,
        country: &Result<Option<String>, EvaluationError>,
    ) -> Result<ConditionOutcome, EvaluationError> {
        let mut window_count = None;
        let mut window_volume = None;
        let mut merchant_country = None;

        match &rule.conditions {
            RuleConditions::TransactionVelocity { window, .. } => {
                let count = self
                    .velocity
                    .count_since(&event.merchant_id, window.duration(), event.occurred_at)
                    .map_err(|e| EvaluationError::Aggregation(e.to_string()))?;
                window_count = Some(count);
            }
            RuleConditions::MerchantVolume { time_window, .. } => {
                let volume = self
                    .velocity
                    .sum_since(&event.merchant_id, time_window.duration(), event.occurred_at, |txn| {
                        self.rates.to_usd(txn.amount, &txn.currency).map_err(|e| {
                            let field = match e {
                                ConversionError::UnknownRate { .. } => "currency",
                                ConversionError::OutOfRange { .. } => "amount",
                            };
                            RiskError::validation(field, format!("{e} (transaction {})", txn.transaction_id))
                        })
                    })
                    .map_err(|e| EvaluationError::Aggregation(e.to_string()))?;
                window_volume = Some(volume);
            }
            RuleConditions::CountryBlock { .. } => {
                merchant_country = country.clone()?;
            }
            RuleConditions::TransactionAmount { .. } | RuleConditions::AddressBlacklist { .. } => {}
        }

        let ctx = ConditionContext {
            event,
            merchant_country: merchant_country.as_deref(),
            rates: &self.rates,
            window_count,
            window_volume,
        };

        condition::evaluate(&rule.name, &rule.conditions, &ctx)
    }

    /// Country on the event wins; otherwise ask the merchant directory.
    fn merchant_country(&self, event: &TransactionEvent) -> Result<Option<String>, EvaluationError> {
        match &event.country {
            Some(country) => Ok(Some(country.clone())),
            None => self
                .merchants
                .country_of(&event.merchant_id)
                .map_err(|e| EvaluationError::MerchantLookup(e.to_string())),
        }
    }

    fn materialize(&self, rule: &RiskRule, event: &TransactionEvent, message: &str) -> RiskResult<()> {
        let spec = NewAlert {
            triggered_rule_id:       rule.id.clone(),
            severity:                rule.severity,
            alert_type:              rule.rule_type.as_str().to_string(),
            message:                 message.to_string(),
            affected_transaction_id: Some(event.transaction_id.clone()),
            affected_merchant_id:    Some(event.merchant_id.clone()),
        };

        self.alerts.create_with_action(spec, &Actor::system(), |alert| {
            if !rule.auto_block {
                return AutoActionTaken::NoAction;
            }
            self.executor.execute(ActionContext {
                rule_id:        &rule.id,
                rule_type:      rule.rule_type,
                severity:       alert.severity,
                merchant_id:    alert.affected_merchant_id.as_deref(),
                transaction_id: alert.affected_transaction_id.as_deref(),
            })
        })?;
        Ok(())
    }
}

fn validate_event(event: &TransactionEvent) -> RiskResult<()> {
    if event.transaction_id.trim().is_empty() {
        return Err(RiskError::validation("transactionId", "must not be empty"));
    }
    if event.merchant_id.trim().is_empty() {
        return Err(RiskError::validation("merchantId", "must not be empty"));
    }
    if event.currency.trim().is_empty() {
        return Err(RiskError::validation("currency", "must not be empty"));
    }
    Ok(())
}

fn failure_result(rule: &RiskRule, err: &EvaluationError) -> RuleEvaluationResult {
    RuleEvaluationResult {
        rule_id:   rule.id.clone(),
        rule_name: rule.name.clone(),
        triggered: false,
        severity:  rule.severity,
        message:   format!("Rule '{}' evaluation failed: {err}", rule.name),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
