//! Deterministic random number generation for synthetic traffic.
//!
//! RULE: the traffic generator never calls a platform RNG. All randomness
//! flows through SeededRng streams derived from one master seed.
//!
//! Each stream is seeded from (master_seed XOR stream_index), so adding a
//! stream never shifts the values an existing stream produces.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct SeededRng {
    inner: Pcg64Mcg,
}

impl SeededRng {
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self { inner: Pcg64Mcg::seed_from_u64(derived_seed) }
    }

    pub fn for_stream(master_seed: u64, stream: Stream) -> Self {
        log::debug!("Seeding {} stream from master seed {master_seed}", stream.name());
        Self::new(master_seed, stream as u64)
    }

    /// Float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// u64 in [0, n). `n == 0` yields 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Simplified Pareto sample. Heavy-tailed, like payment amounts.
    pub fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.next_f64().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }

    /// Uniform pick from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        let idx = self.next_u64_below(items.len() as u64) as usize;
        items.get(idx)
    }
}

/// Stable stream assignments.
/// NEVER reorder or remove entries, only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Merchants = 0,
    Timing    = 1,
    Amounts   = 2,
    Addresses = 3,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Merchants => "merchants",
            Self::Timing    => "timing",
            Self::Amounts   => "amounts",
            Self::Addresses => "addresses",
        }
    }
}
