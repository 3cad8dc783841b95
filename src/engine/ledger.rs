//! Ledger accounting engine: replays ordered chain events into cost basis,
//! realized PnL and collected-fee totals.
//!
//! Replay is pure and deterministic: the same ordered events always produce
//! byte-identical ledger rows, which is what makes rebuilds idempotent.

use crate::domain::{
    sort_events_for_replay, Decimal, EventKind, LedgerEvent, PositionConfig, RawPositionEvent,
};
use crate::math::{self, MathError};
use primitive_types::U256;
use thiserror::Error;

/// Precision used when expressing a withdrawal as a fraction of held
/// liquidity.
const FRACTION_DECIMALS: u8 = 18;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("amount too large for quote accounting: {0}")]
    Numeric(#[from] rust_decimal::Error),
    #[error("decrease of {delta} exceeds held liquidity {held}")]
    LiquidityUnderflow { held: U256, delta: U256 },
    #[error("decrease on a position with no liquidity")]
    NoLiquidity,
}

/// Aggregate output of a full replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutput {
    pub events: Vec<LedgerEvent>,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub collected_fees: Decimal,
    pub liquidity: U256,
}

/// Incremental replay state.
///
/// Feed events in ascending chain order; each call appends one ledger row
/// and advances the running totals.
pub struct LedgerReplay {
    quote_is_token0: bool,
    quote_decimals: u8,
    position: crate::domain::PositionId,
    liquidity: U256,
    cost_basis: Decimal,
    realized_pnl: Decimal,
    collected_fees: Decimal,
    events: Vec<LedgerEvent>,
}

impl LedgerReplay {
    pub fn new(config: &PositionConfig) -> Self {
        LedgerReplay {
            quote_is_token0: config.quote_is_token0,
            quote_decimals: config.quote().decimals(),
            position: config.position_id,
            liquidity: U256::zero(),
            cost_basis: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            collected_fees: Decimal::zero(),
            events: Vec::new(),
        }
    }

    /// Replay a full raw stream from genesis, sorting it into chain order
    /// first.
    pub fn replay(
        config: &PositionConfig,
        mut raw: Vec<RawPositionEvent>,
    ) -> Result<ReplayOutput, ReplayError> {
        sort_events_for_replay(&mut raw);
        let mut replay = LedgerReplay::new(config);
        for event in &raw {
            replay.process_event(event)?;
        }
        Ok(replay.into_output())
    }

    /// Quote value of a pair of raw legs at the event-time price.
    fn leg_value(&self, event: &RawPositionEvent) -> Result<Decimal, ReplayError> {
        let raw = math::value_in_quote(
            event.amount0,
            event.amount1,
            event.sqrt_price_x96,
            self.quote_is_token0,
        )?;
        Ok(Decimal::from_raw_units(raw, self.quote_decimals)?)
    }

    /// Process one event, appending its ledger row.
    pub fn process_event(&mut self, event: &RawPositionEvent) -> Result<(), ReplayError> {
        let (delta_cost_basis, delta_pnl) = match event.kind {
            EventKind::Increase => {
                let deposited = self.leg_value(event)?;
                self.liquidity = self
                    .liquidity
                    .checked_add(event.liquidity_delta)
                    .ok_or(MathError::Overflow)?;
                (deposited, Decimal::zero())
            }
            EventKind::Decrease => {
                if self.liquidity.is_zero() {
                    return Err(ReplayError::NoLiquidity);
                }
                if event.liquidity_delta > self.liquidity {
                    return Err(ReplayError::LiquidityUnderflow {
                        held: self.liquidity,
                        delta: event.liquidity_delta,
                    });
                }
                // Weighted-average basis release: the withdrawn slice takes
                // its pro-rata share of the basis; realized PnL is the
                // difference against what the slice is actually worth now.
                let fraction_raw = math::mul_div(
                    event.liquidity_delta,
                    U256::from(10u64).pow(U256::from(FRACTION_DECIMALS)),
                    self.liquidity,
                )?;
                let fraction = Decimal::from_raw_units(fraction_raw, FRACTION_DECIMALS)?;
                let released = self.cost_basis * fraction;
                let withdrawn_value = self.leg_value(event)?;
                self.liquidity = self.liquidity - event.liquidity_delta;
                (-released, withdrawn_value - released)
            }
            EventKind::Collect => {
                let collected = self.leg_value(event)?;
                self.collected_fees += collected;
                (Decimal::zero(), collected)
            }
        };

        self.cost_basis += delta_cost_basis;
        self.realized_pnl += delta_pnl;

        self.events.push(LedgerEvent {
            event_key: event.event_key(&self.position),
            position_id: self.position,
            kind: event.kind,
            chain_pos: event.chain_pos,
            time_ms: event.time_ms,
            amount0: event.amount0,
            amount1: event.amount1,
            liquidity_delta: event.liquidity_delta,
            sqrt_price_x96: event.sqrt_price_x96,
            delta_cost_basis,
            cost_basis_after: self.cost_basis,
            delta_pnl,
            pnl_after: self.realized_pnl,
        });
        Ok(())
    }

    pub fn into_output(self) -> ReplayOutput {
        ReplayOutput {
            events: self.events,
            cost_basis: self.cost_basis,
            realized_pnl: self.realized_pnl,
            collected_fees: self.collected_fees,
            liquidity: self.liquidity,
        }
    }
}
