//! Liquidity <-> token-amount conversion and fee accrual.

use super::{mul_div, tick::sqrt_price_at_tick, MathError, Q128, Q96, SQRT_PRICE_BOUND};
use primitive_types::U256;

/// Swap direction relative to pool token ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Selling token0 for token1.
    ZeroForOne,
    /// Selling token1 for token0.
    OneForZero,
}

fn check_sqrt_price(sqrt_price: U256) -> Result<(), MathError> {
    if sqrt_price.is_zero() || sqrt_price >= SQRT_PRICE_BOUND {
        return Err(MathError::SqrtPriceOutOfRange);
    }
    Ok(())
}

fn range_sqrt_prices(tick_lower: i32, tick_upper: i32) -> Result<(U256, U256), MathError> {
    if tick_lower >= tick_upper {
        return Err(MathError::InvalidTickRange);
    }
    Ok((
        sqrt_price_at_tick(tick_lower)?,
        sqrt_price_at_tick(tick_upper)?,
    ))
}

/// token0 owed for `liquidity` between two sqrt prices, floor-rounded.
///
/// `amount0 = L * 2^96 * (sqrtB - sqrtA) / (sqrtB * sqrtA)`
fn amount0_for_liquidity(liquidity: U256, sqrt_a: U256, sqrt_b: U256) -> Result<U256, MathError> {
    let (lower, upper) = if sqrt_a < sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    let shifted = liquidity
        .checked_mul(Q96)
        .ok_or(MathError::Overflow)?;
    let partial = mul_div(shifted, upper - lower, upper)?;
    Ok(partial / lower)
}

/// token1 owed for `liquidity` between two sqrt prices, floor-rounded.
///
/// `amount1 = L * (sqrtB - sqrtA) / 2^96`
fn amount1_for_liquidity(liquidity: U256, sqrt_a: U256, sqrt_b: U256) -> Result<U256, MathError> {
    let (lower, upper) = if sqrt_a < sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    mul_div(liquidity, upper - lower, Q96)
}

/// `L = amount0 * (sqrtA * sqrtB / 2^96) / (sqrtB - sqrtA)`
fn liquidity_for_amount0(amount0: U256, sqrt_a: U256, sqrt_b: U256) -> Result<U256, MathError> {
    let (lower, upper) = if sqrt_a < sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    let intermediate = mul_div(lower, upper, Q96)?;
    mul_div(amount0, intermediate, upper - lower)
}

/// `L = amount1 * 2^96 / (sqrtB - sqrtA)`
fn liquidity_for_amount1(amount1: U256, sqrt_a: U256, sqrt_b: U256) -> Result<U256, MathError> {
    let (lower, upper) = if sqrt_a < sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    mul_div(amount1, Q96, upper - lower)
}

/// Maximum liquidity fundable by `amount0`/`amount1` at the current price.
///
/// Three regions: entirely below the range only token0 funds liquidity,
/// entirely above only token1 does, and inside the range the binding leg
/// (the smaller resulting liquidity) wins.
pub fn liquidity_from_amounts(
    sqrt_price: U256,
    tick_lower: i32,
    tick_upper: i32,
    amount0: U256,
    amount1: U256,
) -> Result<U256, MathError> {
    check_sqrt_price(sqrt_price)?;
    let (sqrt_a, sqrt_b) = range_sqrt_prices(tick_lower, tick_upper)?;

    if sqrt_price <= sqrt_a {
        liquidity_for_amount0(amount0, sqrt_a, sqrt_b)
    } else if sqrt_price < sqrt_b {
        let l0 = liquidity_for_amount0(amount0, sqrt_price, sqrt_b)?;
        let l1 = liquidity_for_amount1(amount1, sqrt_a, sqrt_price)?;
        Ok(l0.min(l1))
    } else {
        liquidity_for_amount1(amount1, sqrt_a, sqrt_b)
    }
}

/// Token amounts a position of `liquidity` is entitled to at the current
/// price. Floor-rounded on both legs so entitlement is never over-reported.
pub fn amounts_from_liquidity(
    liquidity: U256,
    sqrt_price: U256,
    tick_lower: i32,
    tick_upper: i32,
) -> Result<(U256, U256), MathError> {
    check_sqrt_price(sqrt_price)?;
    let (sqrt_a, sqrt_b) = range_sqrt_prices(tick_lower, tick_upper)?;

    if sqrt_price <= sqrt_a {
        Ok((amount0_for_liquidity(liquidity, sqrt_a, sqrt_b)?, U256::zero()))
    } else if sqrt_price < sqrt_b {
        Ok((
            amount0_for_liquidity(liquidity, sqrt_price, sqrt_b)?,
            amount1_for_liquidity(liquidity, sqrt_a, sqrt_price)?,
        ))
    } else {
        Ok((U256::zero(), amount1_for_liquidity(liquidity, sqrt_a, sqrt_b)?))
    }
}

/// Fees accrued by `liquidity` since the last snapshot of fee growth inside
/// the range, in raw token units.
///
/// Fee growth counters wrap on overflow by design, so the delta uses
/// wrapping subtraction.
pub fn accrued_fees(
    liquidity: U256,
    fee_growth_inside_now: U256,
    fee_growth_inside_last: U256,
) -> Result<U256, MathError> {
    let (delta, _) = fee_growth_inside_now.overflowing_sub(fee_growth_inside_last);
    mul_div(liquidity, delta, Q128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::sqrt_price_at_tick;

    // A round number of liquidity at a price of 1 (tick 0).
    fn mid_price() -> U256 {
        sqrt_price_at_tick(0).unwrap()
    }

    #[test]
    fn test_amounts_both_legs_in_range() {
        let liq = U256::from(1_000_000_000_000_000_000u128);
        let (a0, a1) =
            amounts_from_liquidity(liq, mid_price(), -1000, 1000).unwrap();
        assert!(!a0.is_zero());
        assert!(!a1.is_zero());
        // Symmetric range around the current price: the legs agree to well
        // under a percent.
        let diff = if a0 > a1 { a0 - a1 } else { a1 - a0 };
        assert!(diff < a0 / 100, "legs diverged: {} vs {}", a0, a1);
    }

    #[test]
    fn test_amounts_below_range_token0_only() {
        let liq = U256::from(1_000_000_000_000u128);
        let below = sqrt_price_at_tick(-2000).unwrap();
        let (a0, a1) = amounts_from_liquidity(liq, below, -1000, 1000).unwrap();
        assert!(!a0.is_zero());
        assert!(a1.is_zero());
    }

    #[test]
    fn test_amounts_above_range_token1_only() {
        let liq = U256::from(1_000_000_000_000u128);
        let above = sqrt_price_at_tick(2000).unwrap();
        let (a0, a1) = amounts_from_liquidity(liq, above, -1000, 1000).unwrap();
        assert!(a0.is_zero());
        assert!(!a1.is_zero());
    }

    #[test]
    fn test_round_trip_never_exceeds_inputs() {
        let cases = [
            (0i32, -1000i32, 1000i32),
            (-2000, -1000, 1000),
            (2000, -1000, 1000),
            (199_500, 199_120, 201_120),
            (500, 0, 600),
        ];
        let amount0 = U256::from(5_000_000_000u64);
        let amount1 = U256::from(7_000_000_000u64);
        for (tick, lower, upper) in cases {
            let price = sqrt_price_at_tick(tick).unwrap();
            let liq = liquidity_from_amounts(price, lower, upper, amount0, amount1).unwrap();
            let (back0, back1) = amounts_from_liquidity(liq, price, lower, upper).unwrap();
            assert!(back0 <= amount0, "tick {}: {} > {}", tick, back0, amount0);
            assert!(back1 <= amount1, "tick {}: {} > {}", tick, back1, amount1);
        }
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = liquidity_from_amounts(mid_price(), 1000, -1000, U256::one(), U256::one());
        assert_eq!(err, Err(MathError::InvalidTickRange));
    }

    #[test]
    fn test_zero_sqrt_price_rejected() {
        let err = amounts_from_liquidity(U256::one(), U256::zero(), -10, 10);
        assert_eq!(err, Err(MathError::SqrtPriceOutOfRange));
    }

    #[test]
    fn test_accrued_fees_basic() {
        // liquidity 2^64, growth delta 2^128 (i.e. 1.0 per unit) -> 2^64.
        let fees = accrued_fees(U256::one() << 64, Q128, U256::zero()).unwrap();
        assert_eq!(fees, U256::one() << 64);
    }

    #[test]
    fn test_accrued_fees_wrapping_counter() {
        // Counter wrapped past U256::MAX: now=4, last=MAX-5 -> delta 10.
        let last = U256::MAX - U256::from(5u64);
        let now = U256::from(4u64);
        let fees = accrued_fees(Q128, now, last).unwrap();
        assert_eq!(fees, U256::from(10u64));
    }
}
