//! Price conversion, position valuation and spot swap estimation.

use super::liquidity::{amounts_from_liquidity, SwapDirection};
use super::{isqrt_u512, mul_div, MathError, Q96, SQRT_PRICE_BOUND};
use crate::domain::{Currency, Decimal};
use primitive_types::{U256, U512};

fn pow10(exp: u32) -> U512 {
    U512::from(10u64).pow(U512::from(exp))
}

/// Convert a human-readable quote-per-base price into the pool's raw Q64.96
/// sqrt price.
///
/// Token ordering matters: the pool keys its price as token1-per-token0 in
/// raw units, where token0 is the lexicographically smaller address. When
/// the base currency is token1 the ratio inverts, and both legs rescale by
/// their decimal counts.
pub fn sqrt_price_from_quote_price(
    base: &Currency,
    quote: &Currency,
    price: Decimal,
) -> Result<U256, MathError> {
    if !price.is_positive() {
        return Err(MathError::NonPositivePrice);
    }
    let inner: rust_decimal::Decimal = price.inner().normalize();
    let mantissa = inner.mantissa().unsigned_abs();
    let scale = inner.scale();

    let base_is_token0 = base.is_token0_of(quote);
    let (d0, d1) = if base_is_token0 {
        (base.decimals() as u32, quote.decimals() as u32)
    } else {
        (quote.decimals() as u32, base.decimals() as u32)
    };

    // Raw ratio R = token1-per-token0 as num/den.
    let (num, den) = if base_is_token0 {
        (U512::from(mantissa) * pow10(d1), pow10(scale + d0))
    } else {
        (pow10(scale + d1), U512::from(mantissa) * pow10(d0))
    };
    if den.is_zero() {
        return Err(MathError::DivisionByZero);
    }

    // sqrt(R) * 2^96 = isqrt(R * 2^192)
    let sqrt = isqrt_u512((num << 192) / den);
    let sqrt = U256::try_from(sqrt).map_err(|_| MathError::Overflow)?;
    if sqrt.is_zero() || sqrt >= SQRT_PRICE_BOUND {
        return Err(MathError::SqrtPriceOutOfRange);
    }
    Ok(sqrt)
}

/// Value a pair of raw token amounts in quote-token raw units at the given
/// pool price.
pub fn value_in_quote(
    amount0: U256,
    amount1: U256,
    sqrt_price: U256,
    quote_is_token0: bool,
) -> Result<U256, MathError> {
    if sqrt_price.is_zero() || sqrt_price >= SQRT_PRICE_BOUND {
        return Err(MathError::SqrtPriceOutOfRange);
    }
    if quote_is_token0 {
        // amount1 / price, price = sqrt^2 / 2^192
        let converted = mul_div(mul_div(amount1, Q96, sqrt_price)?, Q96, sqrt_price)?;
        amount0.checked_add(converted).ok_or(MathError::Overflow)
    } else {
        let converted = mul_div(mul_div(amount0, sqrt_price, Q96)?, sqrt_price, Q96)?;
        amount1.checked_add(converted).ok_or(MathError::Overflow)
    }
}

/// Current value of a position's principal in quote-token raw units: both
/// legs at the current price, summed.
pub fn position_value(
    liquidity: U256,
    sqrt_price: U256,
    tick_lower: i32,
    tick_upper: i32,
    quote_is_token0: bool,
) -> Result<U256, MathError> {
    let (amount0, amount1) =
        amounts_from_liquidity(liquidity, sqrt_price, tick_lower, tick_upper)?;
    value_in_quote(amount0, amount1, sqrt_price, quote_is_token0)
}

/// Zero-impact spot estimate of a swap's output after the pool fee.
///
/// For ranking candidate routes only: assumes infinite depth at the current
/// price, so it is NOT slippage-safe and must never size a real trade.
pub fn expected_swap_output(
    amount_in: U256,
    sqrt_price: U256,
    fee_millionths: u32,
    direction: SwapDirection,
) -> Result<U256, MathError> {
    if sqrt_price.is_zero() || sqrt_price >= SQRT_PRICE_BOUND {
        return Err(MathError::SqrtPriceOutOfRange);
    }
    if fee_millionths >= 1_000_000 {
        return Err(MathError::Overflow);
    }
    let after_fee = mul_div(
        amount_in,
        U256::from(1_000_000 - fee_millionths),
        U256::from(1_000_000u64),
    )?;
    match direction {
        SwapDirection::ZeroForOne => {
            mul_div(mul_div(after_fee, sqrt_price, Q96)?, sqrt_price, Q96)
        }
        SwapDirection::OneForZero => {
            mul_div(mul_div(after_fee, Q96, sqrt_price)?, Q96, sqrt_price)
        }
    }
}
