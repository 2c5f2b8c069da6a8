//! Transaction history log. Append-only; backs velocity and volume windows.

use super::{parse_col, RiskStore};
use crate::{
    collaborators::{TransactionHistory, TransactionRecord},
    error::RiskResult,
    event::TransactionEvent,
    types::{from_millis, to_millis, Timestamp},
};
use rust_decimal::Decimal;
use rusqlite::params;

impl TransactionHistory for RiskStore {
    fn record(&self, event: &TransactionEvent) -> RiskResult<()> {
        self.conn()?.execute(
            "INSERT INTO transaction_log (
                transaction_id, merchant_id, amount, currency,
                from_address, to_address, country, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (transaction_id) DO NOTHING",
            params![
                &event.transaction_id,
                &event.merchant_id,
                event.amount.to_string(),
                &event.currency,
                &event.from_address,
                &event.to_address,
                &event.country,
                to_millis(event.occurred_at),
            ],
        )?;
        Ok(())
    }

    fn count_between(&self, merchant_id: &str, after: Timestamp, until: Timestamp) -> RiskResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM transaction_log
             WHERE merchant_id = ?1 AND occurred_at > ?2 AND occurred_at <= ?3",
            params![merchant_id, to_millis(after), to_millis(until)],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    fn transactions_between(
        &self,
        merchant_id: &str,
        after: Timestamp,
        until: Timestamp,
    ) -> RiskResult<Vec<TransactionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT transaction_id, merchant_id, amount, currency, occurred_at
             FROM transaction_log
             WHERE merchant_id = ?1 AND occurred_at > ?2 AND occurred_at <= ?3
             ORDER BY occurred_at ASC, transaction_id ASC",
        )?;
        let rows = stmt
            .query_map(params![merchant_id, to_millis(after), to_millis(until)], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(transaction_id, merchant_id, amount, currency, occurred_at)| {
                Ok(TransactionRecord {
                    amount: parse_col("amount", &amount, |s| s.parse::<Decimal>())?,
                    transaction_id,
                    merchant_id,
                    currency,
                    occurred_at: from_millis(occurred_at),
                })
            })
            .collect()
    }
}

impl RiskStore {
    pub fn transaction_count(&self) -> RiskResult<i64> {
        Ok(self
            .conn()?
            .query_row("SELECT COUNT(*) FROM transaction_log", [], |r| r.get(0))?)
    }
}
