//! Fixed-point AMM math over arbitrary-precision integers.
//!
//! Everything here is pure and deterministic. Prices are Q64.96 square
//! roots (`sqrt(price) * 2^96`) as used by Uniswap V3-style pools; amounts
//! and liquidity are raw integers. Floating point never enters an amount,
//! liquidity or price path.

pub mod liquidity;
pub mod price;
pub mod tick;

pub use liquidity::{
    accrued_fees, amounts_from_liquidity, liquidity_from_amounts, SwapDirection,
};
pub use price::{
    expected_swap_output, position_value, sqrt_price_from_quote_price, value_in_quote,
};
pub use tick::{sqrt_price_at_tick, MAX_TICK, MIN_TICK};

use primitive_types::{U256, U512};
use thiserror::Error;

/// 2^96, the sqrt-price fixed-point scale.
pub const Q96: U256 = U256([0, 4294967296, 0, 0]);

/// 2^128, the fee-growth fixed-point scale.
pub const Q128: U256 = U256([0, 0, 1, 0]);

/// 2^160, exclusive upper bound for valid sqrt prices.
pub const SQRT_PRICE_BOUND: U256 = U256([0, 0, 4294967296, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("tick {0} outside [-887272, 887272]")]
    TickOutOfRange(i32),
    #[error("tick range invalid: lower must be strictly below upper")]
    InvalidTickRange,
    #[error("sqrt price outside (0, 2^160)")]
    SqrtPriceOutOfRange,
    #[error("price must be positive")]
    NonPositivePrice,
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

/// Floor of `a * b / denominator` with a 512-bit intermediate product.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let wide = a.full_mul(b) / U512::from(denominator);
    U256::try_from(wide).map_err(|_| MathError::Overflow)
}

/// Floor square root of a 512-bit integer by Newton iteration.
///
/// The initial guess `1 << ceil(bits/2)` is always at or above the true
/// root, so the sequence decreases monotonically onto the floor.
pub(crate) fn isqrt_u512(n: U512) -> U512 {
    if n.is_zero() {
        return U512::zero();
    }
    let mut x = U512::one() << ((n.bits() + 1) / 2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}
