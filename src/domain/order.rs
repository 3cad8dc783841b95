//! Close orders: identity, trigger configuration, lifecycle states.

use crate::domain::{Address, PositionId, TimeMs};
use serde::{Deserialize, Serialize};

/// Which close slot an order occupies. At most one ACTIVE order may exist
/// per `(position, kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    StopLoss,
    TakeProfit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::StopLoss => "stop_loss",
            OrderKind::TakeProfit => "take_profit",
        }
    }
}

impl std::str::FromStr for OrderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop_loss" => Ok(OrderKind::StopLoss),
            "take_profit" => Ok(OrderKind::TakeProfit),
            other => Err(format!("unknown order kind: {}", other)),
        }
    }
}

/// Direction the live tick must cross the trigger tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Fires when tick <= trigger.
    Lower,
    /// Fires when tick >= trigger.
    Upper,
}

impl TriggerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Lower => "lower",
            TriggerMode::Upper => "upper",
        }
    }

    /// Whether `tick` satisfies the trigger condition.
    pub fn is_crossed(&self, tick: i32, trigger_tick: i32) -> bool {
        match self {
            TriggerMode::Lower => tick <= trigger_tick,
            TriggerMode::Upper => tick >= trigger_tick,
        }
    }
}

impl std::str::FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lower" => Ok(TriggerMode::Lower),
            "upper" => Ok(TriggerMode::Upper),
            other => Err(format!("unknown trigger mode: {}", other)),
        }
    }
}

/// Off-chain automation lifecycle. Exists only while the on-chain order is
/// ACTIVE; Executed and Cancelled purge the row instead of being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationState {
    Monitoring,
    Executing,
    Retrying,
    Failed,
}

impl AutomationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationState::Monitoring => "monitoring",
            AutomationState::Executing => "executing",
            AutomationState::Retrying => "retrying",
            AutomationState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AutomationState::Failed)
    }
}

impl std::str::FromStr for AutomationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitoring" => Ok(AutomationState::Monitoring),
            "executing" => Ok(AutomationState::Executing),
            "retrying" => Ok(AutomationState::Retrying),
            "failed" => Ok(AutomationState::Failed),
            other => Err(format!("unknown automation state: {}", other)),
        }
    }
}

/// On-chain order status mirrored from the automation contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OnChainStatus {
    None,
    Active,
    Executed,
    Cancelled,
}

/// Optional swap leg executed alongside the close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapIntent {
    /// Currency the withdrawn legs are swapped into.
    pub currency_out: Address,
    /// Minimum acceptable output in raw units (decimal string).
    pub min_output: String,
}

/// A registered close order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOrder {
    pub position_id: PositionId,
    pub kind: OrderKind,
    /// Immutable identity hash over the registration fields.
    pub order_hash: String,
    pub trigger_tick: i32,
    pub trigger_mode: TriggerMode,
    pub state: AutomationState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub swap_intent: Option<SwapIntent>,
    pub registered_at: TimeMs,
    /// Earliest time the next execution attempt may run (set while retrying).
    pub next_attempt_at: Option<TimeMs>,
}

impl CloseOrder {
    /// Compute the immutable identity hash for a registration.
    pub fn compute_order_hash(
        position_id: &PositionId,
        kind: OrderKind,
        trigger_tick: i32,
        trigger_mode: TriggerMode,
        swap_intent: Option<&SwapIntent>,
        registered_at: TimeMs,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(position_id.as_uuid().as_bytes());
        hasher.update(kind.as_str());
        hasher.update(trigger_tick.to_le_bytes());
        hasher.update(trigger_mode.as_str());
        if let Some(intent) = swap_intent {
            hasher.update(intent.currency_out.as_str());
            hasher.update(intent.min_output.as_bytes());
        }
        hasher.update(registered_at.as_ms().to_le_bytes());
        let hash = hasher.finalize();
        format!("ord:{}", hex::encode(&hash[..16]))
    }

    /// Idempotency key for one execution attempt.
    ///
    /// Derived from (order identity, attempt number): a retried broadcast of
    /// the same attempt presents the same key, so the signer side can
    /// deduplicate and a crashed attempt cannot double-execute.
    pub fn idempotency_key(&self, attempt: u32) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.order_hash.as_bytes());
        hasher.update(attempt.to_le_bytes());
        let hash = hasher.finalize();
        format!("idk:{}", hex::encode(&hash[..16]))
    }
}
