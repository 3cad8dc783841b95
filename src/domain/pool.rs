//! Pool and position records.

use crate::domain::{Address, ChainId, Currency, Decimal, PositionId, TimeMs};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Pool state observed from chain. Never written by this engine.
///
/// `fee_growth_inside_0/1` are already scoped to the observed position's
/// tick range, so the fee calculator needs no tick-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    pub sqrt_price_x96: U256,
    pub current_tick: i32,
    pub liquidity: u128,
    pub fee_growth_global_0: U256,
    pub fee_growth_global_1: U256,
    pub fee_growth_inside_0: U256,
    pub fee_growth_inside_1: U256,
    pub observed_at: TimeMs,
}

/// AMM protocol the pool belongs to. Concrete variant per protocol,
/// dispatched explicitly where behavior differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum PoolProtocol {
    #[serde(rename = "uniswap_v3")]
    UniswapV3 { fee_millionths: u32 },
}

impl PoolProtocol {
    pub fn fee_millionths(&self) -> u32 {
        match self {
            PoolProtocol::UniswapV3 { fee_millionths } => *fee_millionths,
        }
    }
}

/// Immutable identity and range of a tracked position.
///
/// Created once at position open, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionConfig {
    pub position_id: PositionId,
    pub owner: Address,
    pub chain_id: ChainId,
    pub pool_address: Address,
    pub protocol: PoolProtocol,
    pub token0: Currency,
    pub token1: Currency,
    /// Which leg the books are denominated in.
    pub quote_is_token0: bool,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

impl PositionConfig {
    pub fn quote(&self) -> &Currency {
        if self.quote_is_token0 {
            &self.token0
        } else {
            &self.token1
        }
    }

    pub fn base(&self) -> &Currency {
        if self.quote_is_token0 {
            &self.token1
        } else {
            &self.token0
        }
    }
}

/// Mutable on-chain position state plus ledger aggregates.
///
/// Mutated on every refresh and every ledger replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionState {
    pub liquidity: U256,
    pub fee_growth_inside_0_last: U256,
    pub fee_growth_inside_1_last: U256,
    pub tokens_owed_0: U256,
    pub tokens_owed_1: U256,
    /// Quote value paid for currently-held assets (ledger output).
    pub cost_basis: Decimal,
    /// Cumulative realized PnL (ledger output).
    pub realized_pnl: Decimal,
    /// Cumulative quote value of collected fees (ledger output).
    pub collected_fees: Decimal,
    pub last_refreshed: Option<TimeMs>,
}

impl PositionState {
    pub fn empty() -> Self {
        PositionState {
            liquidity: U256::zero(),
            fee_growth_inside_0_last: U256::zero(),
            fee_growth_inside_1_last: U256::zero(),
            tokens_owed_0: U256::zero(),
            tokens_owed_1: U256::zero(),
            cost_basis: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            collected_fees: Decimal::zero(),
            last_refreshed: None,
        }
    }

}

/// Where the current price sits relative to the position's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangePhase {
    Below,
    InRange,
    Above,
}

impl RangePhase {
    pub fn from_tick(current_tick: i32, tick_lower: i32, tick_upper: i32) -> Self {
        if current_tick < tick_lower {
            RangePhase::Below
        } else if current_tick < tick_upper {
            RangePhase::InRange
        } else {
            RangePhase::Above
        }
    }
}

impl std::fmt::Display for RangePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangePhase::Below => write!(f, "below"),
            RangePhase::InRange => write!(f, "in-range"),
            RangePhase::Above => write!(f, "above"),
        }
    }
}
