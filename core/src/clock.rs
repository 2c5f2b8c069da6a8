//! Time source. Evaluation, alert lifecycle and the store never call
//! `Utc::now()` directly; they ask the injected clock.

use crate::types::Timestamp;
use chrono::{Duration, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Settable clock for tests and replay.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { current: Mutex::new(start) }
    }

    pub fn set(&self, to: Timestamp) {
        if let Ok(mut current) = self.current.lock() {
            *current = to;
        }
    }

    /// Move forward. Returns the new time.
    pub fn advance(&self, by: Duration) -> Timestamp {
        match self.current.lock() {
            Ok(mut current) => {
                *current += by;
                *current
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
