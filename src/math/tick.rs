//! Tick to sqrt-price conversion.

use super::MathError;
use primitive_types::U256;

/// Lowest tick with a representable sqrt price.
pub const MIN_TICK: i32 = -887272;
/// Highest tick with a representable sqrt price.
pub const MAX_TICK: i32 = 887272;

// Per-bit factors for sqrt(1.0001^-1)^(2^i) in Q128, i = 0..19.
// Multiplying the factors selected by the bits of |tick| yields
// sqrt(1.0001^-|tick|) in Q128; positive ticks invert at the end.
const TICK_FACTORS: [U256; 20] = [
    U256([0xaa2d162d1a594001, 0xfffcb933bd6fad37, 0, 0]),
    U256([0x59a46990580e213a, 0xfff97272373d4132, 0, 0]),
    U256([0xef12357cf3c7fdcc, 0xfff2e50f5f656932, 0, 0]),
    U256([0x1c3624eaa0941cd0, 0xffe5caca7e10e4e6, 0, 0]),
    U256([0xc9db58835c926644, 0xffcb9843d60f6159, 0, 0]),
    U256([0x472e6896dfb254c0, 0xff973b41fa98c081, 0, 0]),
    U256([0x43ec78b326b52861, 0xff2ea16466c96a38, 0, 0]),
    U256([0x11c461f1969c3053, 0xfe5dee046a99a2a8, 0, 0]),
    U256([0xdcffc83b479aa3a4, 0xfcbe86c7900a88ae, 0, 0]),
    U256([0x6f2b074cf7815e54, 0xf987a7253ac41317, 0, 0]),
    U256([0x940c7a398e4b70f3, 0xf3392b0822b70005, 0, 0]),
    U256([0x43b29c7fa6e889d9, 0xe7159475a2c29b74, 0, 0]),
    U256([0x845ad8f792aa5825, 0xd097f3bdfd2022b8, 0, 0]),
    U256([0x8a65dc1f90e061e5, 0xa9f746462d870fdf, 0, 0]),
    U256([0x90bb3df62baf32f7, 0x70d869a156d2a1b8, 0, 0]),
    U256([0x81231505542fcfa6, 0x31be135f97d08fd9, 0, 0]),
    U256([0xc677de54f3e99bc9, 0x09aa508b5b7a84e1, 0, 0]),
    U256([0x6699c329225ee604, 0x005d6af8dedb8119, 0, 0]),
    U256([0x1ea926041bedfe98, 0x00002216e584f5fa, 0, 0]),
    U256([0x91f7dc42444e8fa2, 0x00000000048a1703, 0, 0]),
];

/// Exact `sqrt(1.0001^tick) * 2^96`, rounded up to match on-chain pools.
///
/// # Errors
/// `MathError::TickOutOfRange` outside `[-887272, 887272]`.
pub fn sqrt_price_at_tick(tick: i32) -> Result<U256, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfRange(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 {
        TICK_FACTORS[0]
    } else {
        U256::one() << 128
    };
    for (i, factor) in TICK_FACTORS.iter().enumerate().skip(1) {
        if abs_tick & (1 << i) != 0 {
            // ratio and factor both fit 129 bits, so the wide product
            // shifted down by 128 always fits back into a U256.
            let wide = ratio.full_mul(*factor) >> 128;
            ratio = U256::try_from(wide).map_err(|_| MathError::Overflow)?;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128 -> Q96 with round-up, the convention pools store.
    let rounded = if (ratio & ((U256::one() << 32) - 1)).is_zero() {
        ratio >> 32
    } else {
        (ratio >> 32) + 1
    };
    Ok(rounded)
}
