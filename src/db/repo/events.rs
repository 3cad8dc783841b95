//! Ledger event and APR period persistence.

use super::{decode_decimal, decode_position_id, decode_u256, Repository};
use crate::domain::{ChainPosition, EventKind, LedgerEvent, PositionId, PositionState, TimeMs};
use crate::engine::AprPeriod;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn decode_ledger_event(row: &SqliteRow) -> Result<LedgerEvent, sqlx::Error> {
    let kind_str: String = row.try_get("kind")?;
    let kind: EventKind = kind_str.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: "kind".to_string(),
        source: e.into(),
    })?;

    Ok(LedgerEvent {
        event_key: row.try_get("event_key")?,
        position_id: decode_position_id(row, "position_id")?,
        kind,
        chain_pos: ChainPosition {
            block_number: row.try_get::<i64, _>("block_number")? as u64,
            tx_index: row.try_get::<i64, _>("tx_index")? as u32,
            log_index: row.try_get::<i64, _>("log_index")? as u32,
        },
        time_ms: TimeMs::new(row.try_get("time_ms")?),
        amount0: decode_u256(row, "amount0")?,
        amount1: decode_u256(row, "amount1")?,
        liquidity_delta: decode_u256(row, "liquidity_delta")?,
        sqrt_price_x96: decode_u256(row, "sqrt_price_x96")?,
        delta_cost_basis: decode_decimal(row, "delta_cost_basis")?,
        cost_basis_after: decode_decimal(row, "cost_basis_after")?,
        delta_pnl: decode_decimal(row, "delta_pnl")?,
        pnl_after: decode_decimal(row, "pnl_after")?,
    })
}

impl Repository {
    // =========================================================================
    // Ledger events + APR periods
    // =========================================================================

    /// Replace the whole derived ledger in one transaction.
    ///
    /// This is the commit half of a rebuild: the caller has already fetched
    /// and replayed the full raw stream in memory, so any upstream failure
    /// happened before a single row was touched. Delete-and-insert runs
    /// atomically together with the position aggregate update.
    pub async fn replace_ledger_atomic(
        &self,
        position_id: &PositionId,
        events: &[LedgerEvent],
        periods: &[AprPeriod],
        state: &PositionState,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM ledger_events WHERE position_id = ?")
            .bind(position_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM apr_periods WHERE position_id = ?")
            .bind(position_id.to_string())
            .execute(&mut *tx)
            .await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO ledger_events (
                    position_id, block_number, tx_index, log_index,
                    event_key, kind, time_ms,
                    amount0, amount1, liquidity_delta, sqrt_price_x96,
                    delta_cost_basis, cost_basis_after, delta_pnl, pnl_after
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position_id.to_string())
            .bind(event.chain_pos.block_number as i64)
            .bind(event.chain_pos.tx_index as i64)
            .bind(event.chain_pos.log_index as i64)
            .bind(&event.event_key)
            .bind(event.kind.as_str())
            .bind(event.time_ms.as_ms())
            .bind(event.amount0.to_string())
            .bind(event.amount1.to_string())
            .bind(event.liquidity_delta.to_string())
            .bind(event.sqrt_price_x96.to_string())
            .bind(event.delta_cost_basis.to_canonical_string())
            .bind(event.cost_basis_after.to_canonical_string())
            .bind(event.delta_pnl.to_canonical_string())
            .bind(event.pnl_after.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }

        for (seq, period) in periods.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO apr_periods (
                    position_id, seq, start_ms, end_ms,
                    weighted_cost_basis, yield_accrued
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(position_id.to_string())
            .bind(seq as i64)
            .bind(period.start_ms.as_ms())
            .bind(period.end_ms.as_ms())
            .bind(period.weighted_cost_basis.to_canonical_string())
            .bind(period.yield_accrued.to_canonical_string())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE positions SET
                liquidity = ?, cost_basis = ?, realized_pnl = ?, collected_fees = ?
            WHERE position_id = ?
            "#,
        )
        .bind(state.liquidity.to_string())
        .bind(state.cost_basis.to_canonical_string())
        .bind(state.realized_pnl.to_canonical_string())
        .bind(state.collected_fees.to_canonical_string())
        .bind(position_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    /// Ledger listing, newest first.
    pub async fn query_ledger_events(
        &self,
        position_id: &PositionId,
    ) -> Result<Vec<LedgerEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM ledger_events
            WHERE position_id = ?
            ORDER BY block_number DESC, tx_index DESC, log_index DESC
            "#,
        )
        .bind(position_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(decode_ledger_event).collect()
    }

    /// APR periods in lifetime order.
    pub async fn query_apr_periods(
        &self,
        position_id: &PositionId,
    ) -> Result<Vec<AprPeriod>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM apr_periods WHERE position_id = ? ORDER BY seq ASC",
        )
        .bind(position_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AprPeriod {
                    start_ms: TimeMs::new(row.try_get("start_ms")?),
                    end_ms: TimeMs::new(row.try_get("end_ms")?),
                    weighted_cost_basis: decode_decimal(row, "weighted_cost_basis")?,
                    yield_accrued: decode_decimal(row, "yield_accrued")?,
                })
            })
            .collect()
    }
}
