//! risk-runner: headless replay of synthetic traffic through the risk engine.
//!
//! Usage:
//!   risk-runner --seed 12345 --events 5000 --db run.db
//!   risk-runner --seed 12345 --data-dir ./data --rules ./data/rules.json

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use riskwatch_core::{
    alert::AlertFilter,
    clock::ManualClock,
    collaborators::{InMemoryMerchantDirectory, RecordingTransactionProcessor},
    config::RiskConfig,
    facade::{Collaborators, RiskDesk},
    rule::{NewRule, RuleFilter},
    store::RiskStore,
    traffic::TrafficGenerator,
};
use std::env;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let events = parse_arg(&args, "--events", 2_000usize);
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");
    let rules_path = str_arg(&args, "--rules")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{data_dir}/rules.json"));

    println!("riskwatch risk-runner");
    println!("  seed:      {seed}");
    println!("  events:    {events}");
    println!("  db:        {db}");
    println!("  data_dir:  {data_dir}");
    println!("  rules:     {rules_path}");
    println!();

    let config = RiskConfig::load(data_dir)?;

    // Shared-cache URI keeps every connection on the same in-memory database.
    let db_effective = if db == ":memory:" {
        format!("file:riskrun_{seed}?mode=memory&cache=shared")
    } else {
        db.to_string()
    };
    let store = Arc::new(RiskStore::open(&db_effective)?);
    store.migrate()?;

    // Fixed epoch so a seed replays to the same timestamps.
    let start: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    let clock = Arc::new(ManualClock::new(start));
    let mut traffic = TrafficGenerator::new(seed, start, config.traffic.clone());

    let merchants = Arc::new(InMemoryMerchantDirectory::new());
    for merchant in traffic.merchants() {
        merchants.register(&merchant.id, &merchant.country);
    }
    let processor = Arc::new(RecordingTransactionProcessor::new());

    let parts = Collaborators::backed_by(
        &store,
        &config,
        merchants.clone(),
        processor.clone(),
        clock.clone(),
    );
    let desk = RiskDesk::new(Arc::clone(&store), config, parts);

    seed_rules(&desk, &rules_path)?;

    let mut triggered = 0usize;
    let mut failed = 0usize;
    for event in traffic.take_events(events) {
        clock.set(event.occurred_at);
        let results = desk.evaluate_transaction_event(&event)?;
        triggered += results.iter().filter(|r| r.triggered).count();
        failed += results.iter().filter(|r| r.message.contains("evaluation failed")).count();
    }

    print_summary(&desk, &traffic, &merchants, &processor, events, triggered, failed)
}

/// Load rules from JSON unless the store already has live rules.
fn seed_rules(desk: &RiskDesk, path: &str) -> Result<()> {
    if !desk.list_rules(&RuleFilter::default())?.is_empty() {
        log::info!("Store already has rules; skipping seed from {path}");
        return Ok(());
    }
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    let specs: Vec<NewRule> =
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;
    for spec in specs {
        let rule = desk.create_rule(spec)?;
        println!("  rule {} | {} | {} | {}", rule.id, rule.rule_type, rule.severity, rule.name);
    }
    println!();
    Ok(())
}

fn print_summary(
    desk: &RiskDesk,
    traffic: &TrafficGenerator,
    merchants: &InMemoryMerchantDirectory,
    processor: &RecordingTransactionProcessor,
    events: usize,
    triggered: usize,
    failed: usize,
) -> Result<()> {
    let open = desk.list_alerts(&AlertFilter::default())?;
    let suspended = traffic
        .merchants()
        .iter()
        .filter(|m| merchants.is_suspended(&m.id))
        .count();

    println!("=== RUN SUMMARY ===");
    println!("  events evaluated:   {events}");
    println!("  transactions kept:  {}", desk.store().transaction_count()?);
    println!("  rule hits:          {triggered}");
    println!("  evaluation errors:  {failed}");
    println!("  alerts (total):     {}", desk.store().alert_count()?);
    println!("  alerts (open):      {}", open.len());
    println!("  rejected txns:      {}", processor.rejected().len());
    println!("  suspended merchants:{suspended:>3}");

    println!();
    println!("=== MOST-ALERTED MERCHANTS ===");
    let flagged = desk.flagged_merchants()?;
    if flagged.is_empty() {
        println!("  (none)");
    }
    for m in flagged.iter().take(5) {
        println!("  {} | alerts: {} | worst: {}", m.merchant_id, m.alert_count, m.max_severity);
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
