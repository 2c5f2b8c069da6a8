//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods; they never execute SQL directly.
//!
//! The connection sits behind a mutex so one store can be shared across
//! worker threads; every statement runs under that lock, which is also what
//! serializes concurrent alert inserts for the same (rule, transaction).

mod alerts;
mod audit;
pub use audit::AuditEntry;
mod rules;
mod transactions;

use crate::error::{RiskError, RiskResult};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

pub struct RiskStore {
    conn: Mutex<Connection>,
}

impl RiskStore {
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_risk_rules.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_risk_alerts.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/003_transaction_log_audit.sql"))?;
        Ok(())
    }

    fn conn(&self) -> RiskResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RiskError::LockPoisoned)
    }
}

/// Map a textual column into a domain value, reporting which column was bad.
fn parse_col<T, E>(column: &str, raw: &str, parse: impl FnOnce(&str) -> Result<T, E>) -> RiskResult<T>
where
    E: std::fmt::Display,
{
    parse(raw).map_err(|e| {
        RiskError::Other(anyhow::anyhow!("corrupt {column} value '{raw}': {e}"))
    })
}
