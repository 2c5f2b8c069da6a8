//! Synthetic transaction traffic.
//!
//! Produces a reproducible stream of `TransactionEvent`s for a fixed
//! merchant population: heavy-tailed amounts, occasional bursts from one
//! merchant, and a small share of payments touching watched addresses.
//! Same seed and profile ⇒ identical stream.

use crate::{
    event::TransactionEvent,
    rng::{SeededRng, Stream},
    types::{EntityId, Timestamp},
};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficProfile {
    pub merchant_count:    usize,
    pub countries:         Vec<String>,
    pub currencies:        Vec<String>,
    /// Addresses that occasionally appear as counterparties.
    pub watched_addresses: Vec<String>,
    pub watched_rate:      f64,
    /// Probability the next event repeats the previous merchant seconds later.
    pub burst_rate:        f64,
    pub max_gap_secs:      u64,
}

impl Default for TrafficProfile {
    fn default() -> Self {
        Self {
            merchant_count:    12,
            countries:         ["US", "GB", "DE", "NG", "KP", "IR"].map(String::from).to_vec(),
            currencies:        ["USD", "EUR", "GBP", "NGN"].map(String::from).to_vec(),
            watched_addresses: vec!["0xDEADBEEF00000000000000000000000000000001".to_string()],
            watched_rate:      0.02,
            burst_rate:        0.15,
            max_gap_secs:      900,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMerchant {
    pub id:      EntityId,
    pub country: String,
}

pub struct TrafficGenerator {
    seed:      u64,
    profile:   TrafficProfile,
    merchants: Vec<SyntheticMerchant>,
    timing:    SeededRng,
    amounts:   SeededRng,
    addresses: SeededRng,
    picker:    SeededRng,
    cursor:    Timestamp,
    last:      Option<usize>,
    seq:       u64,
}

impl TrafficGenerator {
    pub fn new(seed: u64, start: Timestamp, profile: TrafficProfile) -> Self {
        let mut population = SeededRng::for_stream(seed, Stream::Merchants);
        let merchants = (0..profile.merchant_count.max(1))
            .map(|i| SyntheticMerchant {
                id:      format!("merchant-{i:03}"),
                country: population.pick(&profile.countries).cloned().unwrap_or_else(|| "US".into()),
            })
            .collect();

        Self {
            seed,
            merchants,
            timing: SeededRng::for_stream(seed, Stream::Timing),
            amounts: SeededRng::for_stream(seed, Stream::Amounts),
            addresses: SeededRng::for_stream(seed, Stream::Addresses),
            picker: population,
            profile,
            cursor: start,
            last: None,
            seq: 0,
        }
    }

    pub fn merchants(&self) -> &[SyntheticMerchant] {
        &self.merchants
    }

    pub fn next_event(&mut self) -> TransactionEvent {
        let burst = self.last.is_some() && self.timing.chance(self.profile.burst_rate);
        let (idx, gap_secs) = match self.last {
            Some(prev) if burst => (prev, 1 + self.timing.next_u64_below(30)),
            _ => (
                self.picker.next_u64_below(self.merchants.len() as u64) as usize,
                1 + self.timing.next_u64_below(self.profile.max_gap_secs.max(1)),
            ),
        };
        self.cursor += Duration::seconds(gap_secs as i64);
        self.last = Some(idx);
        self.seq += 1;

        let merchant = &self.merchants[idx];
        let currency = self
            .amounts
            .pick(&self.profile.currencies)
            .cloned()
            .unwrap_or_else(|| "USD".into());
        // Cents, capped so a freak tail draw stays a plausible payment.
        let cents = (self.amounts.pareto(20.0, 1.2) * 100.0).round().min(50_000_000.0) as i64;

        let counterparty = if self.addresses.chance(self.profile.watched_rate) {
            let watched = self.addresses.pick(&self.profile.watched_addresses).cloned();
            // Case varies in the wild; matching must not care.
            watched.map(|a| if self.addresses.chance(0.5) { a.to_ascii_lowercase() } else { a })
        } else {
            None
        };
        let counterparty = counterparty.unwrap_or_else(|| format!("0x{:040x}", self.addresses.next_u64()));

        TransactionEvent {
            transaction_id: format!("txn-{:x}-{:06}", self.seed, self.seq),
            merchant_id:    merchant.id.clone(),
            amount:         Decimal::new(cents, 2),
            currency,
            from_address:   Some(counterparty),
            to_address:     Some(format!("0x{:040x}", idx as u64 + 1)),
            // About half the events carry the country; the rest need the directory.
            country:        self.picker.chance(0.5).then(|| merchant.country.clone()),
            occurred_at:    self.cursor,
        }
    }

    pub fn take_events(&mut self, count: usize) -> Vec<TransactionEvent> {
        (0..count).map(|_| self.next_event()).collect()
    }
}
