//! Close-order persistence and atomic lifecycle transitions.
//!
//! Every transition is a compare-and-swap on `automation_state`, so two
//! racing pollers (or a poller racing a cancellation) can never both win:
//! exactly one UPDATE/DELETE observes the expected state.

use super::{decode_position_id, Repository};
use crate::domain::{
    AutomationState, CloseOrder, OrderKind, PositionId, SwapIntent, TimeMs, TriggerMode,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn decode_str_col<T: std::str::FromStr<Err = String>>(
    row: &SqliteRow,
    col: &str,
) -> Result<T, sqlx::Error> {
    let s: String = row.try_get(col)?;
    s.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: e.into(),
    })
}

fn decode_order(row: &SqliteRow) -> Result<CloseOrder, sqlx::Error> {
    let swap_intent: Option<SwapIntent> = row
        .try_get::<Option<String>, _>("swap_intent_json")?
        .map(|json| {
            serde_json::from_str(&json).map_err(|e| sqlx::Error::ColumnDecode {
                index: "swap_intent_json".to_string(),
                source: Box::new(e),
            })
        })
        .transpose()?;

    Ok(CloseOrder {
        position_id: decode_position_id(row, "position_id")?,
        kind: decode_str_col::<OrderKind>(row, "order_kind")?,
        order_hash: row.try_get("order_hash")?,
        trigger_tick: row.try_get::<i64, _>("trigger_tick")? as i32,
        trigger_mode: decode_str_col::<TriggerMode>(row, "trigger_mode")?,
        state: decode_str_col::<AutomationState>(row, "automation_state")?,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        last_error: row.try_get("last_error")?,
        swap_intent,
        registered_at: TimeMs::new(row.try_get("registered_at_ms")?),
        next_attempt_at: row
            .try_get::<Option<i64>, _>("next_attempt_at_ms")?
            .map(TimeMs::new),
    })
}

impl Repository {
    // =========================================================================
    // Close orders
    // =========================================================================

    /// Register a close order into its `(position, kind)` slot.
    ///
    /// Returns false when the slot already holds a live order. A terminally
    /// failed order may be replaced: that is exactly the manual
    /// re-registration path.
    pub async fn insert_close_order(&self, order: &CloseOrder) -> Result<bool, sqlx::Error> {
        let swap_intent_json = order
            .swap_intent
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO close_orders (
                position_id, order_kind, order_hash, trigger_tick, trigger_mode,
                automation_state, attempts, last_error, swap_intent_json,
                registered_at_ms, next_attempt_at_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(position_id, order_kind) DO UPDATE SET
                order_hash = excluded.order_hash,
                trigger_tick = excluded.trigger_tick,
                trigger_mode = excluded.trigger_mode,
                automation_state = excluded.automation_state,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                swap_intent_json = excluded.swap_intent_json,
                registered_at_ms = excluded.registered_at_ms,
                next_attempt_at_ms = excluded.next_attempt_at_ms
            WHERE close_orders.automation_state = 'failed'
            "#,
        )
        .bind(order.position_id.to_string())
        .bind(order.kind.as_str())
        .bind(&order.order_hash)
        .bind(order.trigger_tick as i64)
        .bind(order.trigger_mode.as_str())
        .bind(order.state.as_str())
        .bind(order.attempts as i64)
        .bind(&order.last_error)
        .bind(swap_intent_json)
        .bind(order.registered_at.as_ms())
        .bind(order.next_attempt_at.map(|t| t.as_ms()))
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_close_order(
        &self,
        position_id: &PositionId,
        kind: OrderKind,
    ) -> Result<Option<CloseOrder>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM close_orders WHERE position_id = ? AND order_kind = ?",
        )
        .bind(position_id.to_string())
        .bind(kind.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(decode_order).transpose()
    }

    /// All live orders, oldest registration first.
    pub async fn list_close_orders(&self) -> Result<Vec<CloseOrder>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM close_orders ORDER BY registered_at_ms ASC")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(decode_order).collect()
    }

    /// CAS the order from `expected` into `next`. Returns false if another
    /// writer got there first.
    pub async fn transition_order(
        &self,
        position_id: &PositionId,
        kind: OrderKind,
        expected: AutomationState,
        next: AutomationState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE close_orders SET automation_state = ?
            WHERE position_id = ? AND order_kind = ? AND automation_state = ?
            "#,
        )
        .bind(next.as_str())
        .bind(position_id.to_string())
        .bind(kind.as_str())
        .bind(expected.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS from Executing into Retrying, recording the attempt and reason.
    pub async fn record_retry(
        &self,
        position_id: &PositionId,
        kind: OrderKind,
        attempts: u32,
        error: &str,
        next_attempt_at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE close_orders SET
                automation_state = 'retrying',
                attempts = ?,
                last_error = ?,
                next_attempt_at_ms = ?
            WHERE position_id = ? AND order_kind = ? AND automation_state = 'executing'
            "#,
        )
        .bind(attempts as i64)
        .bind(error)
        .bind(next_attempt_at.as_ms())
        .bind(position_id.to_string())
        .bind(kind.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminal failure: record the final attempt count and reason.
    pub async fn mark_order_failed(
        &self,
        position_id: &PositionId,
        kind: OrderKind,
        attempts: u32,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE close_orders SET
                automation_state = 'failed',
                attempts = ?,
                last_error = ?,
                next_attempt_at_ms = NULL
            WHERE position_id = ? AND order_kind = ?
              AND automation_state IN ('executing', 'retrying', 'monitoring')
            "#,
        )
        .bind(attempts as i64)
        .bind(reason)
        .bind(position_id.to_string())
        .bind(kind.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Purge an order whose on-chain status went EXECUTED or CANCELLED, or
    /// that the user cancelled. Only non-terminal rows can be cancelled;
    /// returns false when nothing was purged (already failed or gone).
    pub async fn purge_order(
        &self,
        position_id: &PositionId,
        kind: OrderKind,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM close_orders
            WHERE position_id = ? AND order_kind = ? AND automation_state != 'failed'
            "#,
        )
        .bind(position_id.to_string())
        .bind(kind.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
