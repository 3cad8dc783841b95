//! Pure close-order lifecycle decisions.
//!
//! Everything here is synchronous and side-effect free; the monitor owns
//! persistence and I/O. Keeping the decisions pure makes every branch of
//! the state machine unit-testable without a database or signer.

use crate::domain::{CloseOrder, PositionConfig, TimeMs};
use crate::signing::{ExecutionRequest, IntentEffect, StrategyIntent};

/// What to do with a failed execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePlan {
    /// Schedule another attempt at the given time.
    Retry { attempts: u32, next_attempt_at: TimeMs },
    /// Attempt ceiling reached; the order fails terminally.
    GiveUp { attempts: u32 },
}

/// Classify an execution failure into retry-or-fail.
///
/// `attempt` is the attempt that just failed (1-based). The ceiling is a
/// hard bound: unbounded retry is not an option.
pub fn plan_after_failure(
    attempt: u32,
    retry_ceiling: u32,
    now: TimeMs,
    backoff_ms: i64,
) -> FailurePlan {
    if attempt >= retry_ceiling {
        FailurePlan::GiveUp { attempts: attempt }
    } else {
        FailurePlan::Retry {
            attempts: attempt,
            next_attempt_at: TimeMs::new(now.as_ms() + backoff_ms),
        }
    }
}

/// Whether a retrying order's backoff delay has elapsed.
pub fn retry_due(order: &CloseOrder, now: TimeMs) -> bool {
    match order.next_attempt_at {
        Some(at) => now >= at,
        None => true,
    }
}

/// Check a configured swap intent against the signed strategy intent.
///
/// Runs before anything reaches the signer: an order whose swap leg is not
/// covered by the allow-list fails terminally without a signing attempt.
/// Orders with no swap leg need no intent at all.
pub fn check_compliance(
    order: &CloseOrder,
    intent: Option<&StrategyIntent>,
    now: TimeMs,
) -> Result<(), String> {
    let Some(swap) = &order.swap_intent else {
        return Ok(());
    };
    let Some(intent) = intent else {
        return Err("no signed strategy intent on file for swap order".to_string());
    };
    if !intent.is_valid_at(now) {
        return Err("strategy intent expired".to_string());
    }
    if !intent.permits_effect(IntentEffect::SwapOnClose) {
        return Err("strategy intent does not permit swap-on-close".to_string());
    }
    if !intent.permits_currency(&swap.currency_out) {
        return Err(format!(
            "swap target {} not in intent allow-list",
            swap.currency_out
        ));
    }
    Ok(())
}

/// Build the signer request for one attempt.
///
/// The idempotency key pins (order identity, attempt number); the calldata
/// encodes the close deterministically so a rebroadcast is byte-identical.
pub fn build_execution_request(
    order: &CloseOrder,
    config: &PositionConfig,
    attempt: u32,
) -> ExecutionRequest {
    let close_call = serde_json::json!({
        "op": "closePosition",
        "pool": config.pool_address.as_str(),
        "tickLower": config.tick_lower,
        "tickUpper": config.tick_upper,
        "orderHash": order.order_hash,
        "swap": order.swap_intent,
    });
    ExecutionRequest {
        order_hash: order.order_hash.clone(),
        idempotency_key: order.idempotency_key(attempt),
        calldata: format!("0x{}", hex::encode(close_call.to_string())),
    }
}
