//! Close-order subsystem: registration, lifecycle decisions, poll loop.

pub mod lifecycle;
pub mod monitor;

pub use monitor::OrderMonitor;

use crate::db::Repository;
use crate::domain::{
    AutomationState, CloseOrder, OrderKind, PositionId, SwapIntent, TimeMs, TriggerMode,
};
use crate::error::AppError;
use crate::math::{MAX_TICK, MIN_TICK};
use serde::Serialize;

/// One applied lifecycle transition, reported for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTransition {
    pub position_id: PositionId,
    pub kind: OrderKind,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl AppliedTransition {
    fn new(order: &CloseOrder, from: &str, to: &str) -> Self {
        AppliedTransition {
            position_id: order.position_id,
            kind: order.kind,
            from: from.to_string(),
            to: to.to_string(),
            attempt: None,
            reason: None,
            tx_hash: None,
        }
    }

    fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }
}

/// Register a close order into its `(position, kind)` slot.
///
/// Fails `Validation` when the trigger tick is unrepresentable and
/// `DuplicateActiveSlot` when a live order already occupies the slot.
pub async fn register_order(
    repo: &Repository,
    position_id: PositionId,
    kind: OrderKind,
    trigger_tick: i32,
    trigger_mode: TriggerMode,
    swap_intent: Option<SwapIntent>,
) -> Result<CloseOrder, AppError> {
    if !(MIN_TICK..=MAX_TICK).contains(&trigger_tick) {
        return Err(AppError::Validation(format!(
            "trigger tick {} outside [{}, {}]",
            trigger_tick, MIN_TICK, MAX_TICK
        )));
    }

    if repo.get_position(&position_id).await?.is_none() {
        return Err(AppError::NotFound(format!("position {}", position_id)));
    }

    let registered_at = TimeMs::now();
    let order = CloseOrder {
        position_id,
        kind,
        order_hash: CloseOrder::compute_order_hash(
            &position_id,
            kind,
            trigger_tick,
            trigger_mode,
            swap_intent.as_ref(),
            registered_at,
        ),
        trigger_tick,
        trigger_mode,
        state: AutomationState::Monitoring,
        attempts: 0,
        last_error: None,
        swap_intent,
        registered_at,
        next_attempt_at: None,
    };

    if !repo.insert_close_order(&order).await? {
        return Err(AppError::DuplicateActiveSlot);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{sample_config, setup_repo};
    use crate::domain::PositionState;

    #[tokio::test]
    async fn test_register_rejects_out_of_range_tick() {
        let (repo, _temp) = setup_repo().await;
        let err = register_order(
            &repo,
            PositionId::generate(),
            OrderKind::StopLoss,
            MAX_TICK + 1,
            TriggerMode::Upper,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_position() {
        let (repo, _temp) = setup_repo().await;
        let err = register_order(
            &repo,
            PositionId::generate(),
            OrderKind::StopLoss,
            199_000,
            TriggerMode::Lower,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_enforces_single_active_slot() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        register_order(
            &repo,
            config.position_id,
            OrderKind::StopLoss,
            199_000,
            TriggerMode::Lower,
            None,
        )
        .await
        .unwrap();

        let err = register_order(
            &repo,
            config.position_id,
            OrderKind::StopLoss,
            198_000,
            TriggerMode::Lower,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::DuplicateActiveSlot));
    }
}
