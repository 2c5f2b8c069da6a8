//! riskwatch-core: rule evaluation and alerting for merchant payments.
//!
//! Transactions come in, operator-configured rules are evaluated against
//! them, triggered rules raise alerts (with optional automatic mitigation)
//! and operators resolve those alerts. `facade::RiskDesk` is the entry point.

pub mod alert;
pub mod alert_lifecycle;
pub mod audit;
pub mod auto_action;
pub mod clock;
pub mod collaborators;
pub mod condition;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod facade;
pub mod rng;
pub mod rule;
pub mod rule_store;
pub mod store;
pub mod traffic;
pub mod types;
pub mod velocity;
