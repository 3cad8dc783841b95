//! Lossless decimal numeric type for quote-denominated accounting.
//!
//! Backed by rust_decimal: cost basis, PnL and fee aggregates must never
//! pick up floating-point drift. On-chain quantities stay in `U256` and are
//! converted here only when valued in quote units.

use primitive_types::U256;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lossless decimal for quote-token accounting values.
///
/// Serializes to a JSON number (not a string) by default.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    /// Wrap a RustDecimal.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Convert a raw on-chain integer amount into token units.
    ///
    /// `decimals` is the token's decimal count; `1_500_000` with 6 decimals
    /// becomes `1.5`. Fails when the amount has more significant digits than
    /// a 96-bit decimal mantissa can hold — amounts that large are corrupt
    /// observations, not balances.
    pub fn from_raw_units(raw: U256, decimals: u8) -> Result<Self, rust_decimal::Error> {
        let digits = raw.to_string();
        let scaled = if decimals == 0 {
            digits
        } else if digits.len() > decimals as usize {
            let split = digits.len() - decimals as usize;
            format!("{}.{}", &digits[..split], &digits[split..])
        } else {
            format!("0.{}{}", "0".repeat(decimals as usize - digits.len()), digits)
        };
        RustDecimal::from_str(&scaled).map(|d| Decimal(d.normalize()))
    }

    /// Format as a canonical string (no exponent notation, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    /// Get the underlying RustDecimal.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// The additive identity (0).
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// Returns true if the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Division returning None when the divisor is zero.
    pub fn checked_div(&self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_div(rhs.0).map(Decimal)
    }

    /// Lossy conversion for display-only percentages.
    pub fn to_f64_lossy(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_units_basic() {
        let d = Decimal::from_raw_units(U256::from(1_500_000u64), 6).unwrap();
        assert_eq!(d.to_canonical_string(), "1.5");
    }

    #[test]
    fn test_from_raw_units_smaller_than_one() {
        let d = Decimal::from_raw_units(U256::from(42u64), 6).unwrap();
        assert_eq!(d.to_canonical_string(), "0.000042");
    }

    #[test]
    fn test_from_raw_units_zero_decimals() {
        let d = Decimal::from_raw_units(U256::from(777u64), 0).unwrap();
        assert_eq!(d.to_canonical_string(), "777");
    }

    #[test]
    fn test_from_raw_units_overflow_rejected() {
        assert!(Decimal::from_raw_units(U256::MAX, 18).is_err());
    }

    #[test]
    fn test_canonical_roundtrip() {
        for s in ["123.456", "0.0001", "-99.5", "0"] {
            let d = Decimal::from_str_canonical(s).unwrap();
            let reparsed = Decimal::from_str_canonical(&d.to_canonical_string()).unwrap();
            assert_eq!(d, reparsed, "roundtrip failed for {}", s);
        }
    }

    #[test]
    fn test_checked_div_by_zero() {
        let a = Decimal::from_str_canonical("10").unwrap();
        assert!(a.checked_div(Decimal::zero()).is_none());
    }

    #[test]
    fn test_arithmetic() {
        let a = Decimal::from_str_canonical("10.5").unwrap();
        let b = Decimal::from_str_canonical("2.5").unwrap();
        assert_eq!((a + b).to_canonical_string(), "13");
        assert_eq!((a - b).to_canonical_string(), "8");
        assert_eq!((a * b).to_canonical_string(), "26.25");
        assert_eq!((-a).to_canonical_string(), "-10.5");
    }

    #[test]
    fn test_json_serializes_as_number() {
        let d = Decimal::from_str_canonical("123.456").unwrap();
        let json = serde_json::to_value(d).unwrap();
        assert!(json.is_number());
    }
}
