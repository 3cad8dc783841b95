//! Position status calculator.
//!
//! Derives current value, unrealized PnL, unclaimed fees and range phase
//! from observed pool state plus stored position state. Pure: never mutates
//! its inputs, raises math errors unclassified for the caller to sort into
//! retryable vs. terminal.

use crate::domain::{Decimal, PoolState, PositionConfig, PositionState, RangePhase};
use crate::math::{self, MathError};
use primitive_types::U256;
use serde::Serialize;
use thiserror::Error;

/// Derived, display-ready view of a position at one price observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionStatus {
    pub phase: RangePhase,
    /// Principal value in quote units.
    pub current_value: Decimal,
    /// `current_value - cost_basis`.
    pub unrealized_pnl: Decimal,
    /// Both fee legs valued in quote units and summed.
    pub unclaimed_fees: Decimal,
    /// Raw unclaimed fee amounts per leg.
    pub unclaimed_fees_0: U256,
    pub unclaimed_fees_1: U256,
    pub current_tick: i32,
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("amount too large for quote accounting: {0}")]
    Numeric(#[from] rust_decimal::Error),
}

/// Compute the live status of a position.
///
/// Recomputed on every price observation and after every refresh; this is
/// also the trigger oracle the close-order monitor reads ticks through.
pub fn derive_status(
    config: &PositionConfig,
    state: &PositionState,
    pool: &PoolState,
) -> Result<PositionStatus, StatusError> {
    let quote_decimals = config.quote().decimals();

    let value_raw = math::position_value(
        state.liquidity,
        pool.sqrt_price_x96,
        config.tick_lower,
        config.tick_upper,
        config.quote_is_token0,
    )?;
    let current_value = Decimal::from_raw_units(value_raw, quote_decimals)?;

    // Fees: what the pool already owes us plus growth since our snapshot.
    let accrued_0 = math::accrued_fees(
        state.liquidity,
        pool.fee_growth_inside_0,
        state.fee_growth_inside_0_last,
    )?;
    let accrued_1 = math::accrued_fees(
        state.liquidity,
        pool.fee_growth_inside_1,
        state.fee_growth_inside_1_last,
    )?;
    let owed_0 = state
        .tokens_owed_0
        .checked_add(accrued_0)
        .ok_or(MathError::Overflow)?;
    let owed_1 = state
        .tokens_owed_1
        .checked_add(accrued_1)
        .ok_or(MathError::Overflow)?;
    let fees_raw = math::value_in_quote(
        owed_0,
        owed_1,
        pool.sqrt_price_x96,
        config.quote_is_token0,
    )?;
    let unclaimed_fees = Decimal::from_raw_units(fees_raw, quote_decimals)?;

    Ok(PositionStatus {
        phase: RangePhase::from_tick(pool.current_tick, config.tick_lower, config.tick_upper),
        unrealized_pnl: current_value - state.cost_basis,
        current_value,
        unclaimed_fees,
        unclaimed_fees_0: owed_0,
        unclaimed_fees_1: owed_1,
        current_tick: pool.current_tick,
    })
}
