//! Currency variants and pair ordering.

use crate::domain::Address;
use serde::{Deserialize, Serialize};

/// A currency a pool leg can be denominated in.
///
/// Variant set instead of a class hierarchy: each protocol adapter matches
/// on the case it can settle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Currency {
    /// Standard ERC-20 token.
    Erc20 {
        address: Address,
        decimals: u8,
        symbol: String,
    },
    /// Chain-native currency (pools hold its wrapped form; the wrapper
    /// address is what participates in token ordering).
    Native {
        wrapped_address: Address,
        decimals: u8,
        symbol: String,
    },
}

impl Currency {
    pub fn erc20(address: impl Into<String>, decimals: u8, symbol: impl Into<String>) -> Self {
        Currency::Erc20 {
            address: Address::new(address),
            decimals,
            symbol: symbol.into(),
        }
    }

    /// The address used for pool token ordering.
    pub fn sort_address(&self) -> &Address {
        match self {
            Currency::Erc20 { address, .. } => address,
            Currency::Native { wrapped_address, .. } => wrapped_address,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Currency::Erc20 { decimals, .. } | Currency::Native { decimals, .. } => *decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Currency::Erc20 { symbol, .. } | Currency::Native { symbol, .. } => symbol,
        }
    }

    /// True when `self` sorts before `other`, i.e. `self` is token0 of the
    /// pair. Pools key their price as token1-per-token0.
    pub fn is_token0_of(&self, other: &Currency) -> bool {
        self.sort_address() < other.sort_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ordering_by_address() {
        let usdc = Currency::erc20("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6, "USDC");
        let weth = Currency::erc20("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18, "WETH");
        assert!(usdc.is_token0_of(&weth));
        assert!(!weth.is_token0_of(&usdc));
    }

    #[test]
    fn test_native_sorts_by_wrapped_address() {
        let native = Currency::Native {
            wrapped_address: Address::new("0x0001"),
            decimals: 18,
            symbol: "ETH".to_string(),
        };
        let token = Currency::erc20("0x0002", 18, "TKN");
        assert!(native.is_token0_of(&token));
    }
}
