//! Chain source abstractions: pool price reads, raw position events, and
//! mirrored order status.
//!
//! These are the engine's only windows onto the blockchain. Implementations
//! own transport, pagination, retry/backoff and rate limiting; callers see
//! ordered, deduplicated, typed data or a classified error.

use crate::domain::{
    Address, ChainId, OnChainStatus, PoolState, PositionConfig, RawPositionEvent,
};
use async_trait::async_trait;
use primitive_types::U256;
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod rpc;

pub use mock::MockChainSource;
pub use rpc::HttpChainSource;

/// Error type for chain source operations.
#[derive(Debug, Clone, Error)]
pub enum ChainSourceError {
    /// Transport failure (connection refused, DNS, timeout).
    #[error("network error: {0}")]
    Network(String),
    /// HTTP-level failure from the upstream node or indexer.
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    /// Response arrived but could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
    /// Upstream told us to slow down.
    #[error("rate limited by upstream")]
    RateLimited,
    /// The chain answered with values that cannot all be true at once.
    #[error("inconsistent chain data: {0}")]
    Inconsistent(String),
}

impl ChainSourceError {
    /// Transient errors are worth retrying; the rest need review.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainSourceError::Network(_) | ChainSourceError::RateLimited
        ) || matches!(self, ChainSourceError::Http { status, .. } if *status >= 500)
    }
}

/// On-chain view of a single position NFT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainPosition {
    pub liquidity: U256,
    pub fee_growth_inside_0_last: U256,
    pub fee_growth_inside_1_last: U256,
    pub tokens_owed_0: U256,
    pub tokens_owed_1: U256,
}

impl OnChainPosition {
    /// An all-zero read means the NFT was burned or the node served a bad
    /// snapshot; either way the data cannot be trusted.
    pub fn looks_burned(&self) -> bool {
        self.liquidity.is_zero()
            && self.fee_growth_inside_0_last.is_zero()
            && self.fee_growth_inside_1_last.is_zero()
            && self.tokens_owed_0.is_zero()
            && self.tokens_owed_1.is_zero()
    }
}

/// Live pool prices and per-position chain state.
#[async_trait]
pub trait PoolPriceSource: Send + Sync + fmt::Debug {
    /// Fetch pool state for `(chain_id, pool)` at the latest block, or a
    /// pinned historical block when `at_block` is set.
    ///
    /// The tick range scopes the fee-growth-inside accumulators in the
    /// returned state to the caller's position.
    async fn fetch_pool_state(
        &self,
        chain_id: ChainId,
        pool: &Address,
        tick_range: (i32, i32),
        at_block: Option<u64>,
    ) -> Result<PoolState, ChainSourceError>;

    /// Fetch the on-chain state of the position NFT itself.
    async fn fetch_position(
        &self,
        config: &PositionConfig,
    ) -> Result<OnChainPosition, ChainSourceError>;
}

/// Ordered, deduplicated stream of raw position events.
#[async_trait]
pub trait RawEventSource: Send + Sync + fmt::Debug {
    /// Fetch the position's full event history from genesis.
    async fn fetch_events(
        &self,
        config: &PositionConfig,
    ) -> Result<Vec<RawPositionEvent>, ChainSourceError>;
}

/// Mirrored status of close orders registered with the automation contract.
#[async_trait]
pub trait OrderStatusSource: Send + Sync + fmt::Debug {
    async fn fetch_order_status(
        &self,
        chain_id: ChainId,
        order_hash: &str,
    ) -> Result<OnChainStatus, ChainSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChainSourceError::Network("timeout".into()).is_transient());
        assert!(ChainSourceError::RateLimited.is_transient());
        assert!(ChainSourceError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!ChainSourceError::Http {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!ChainSourceError::Inconsistent("zeroed state".into()).is_transient());
    }

    #[test]
    fn test_burned_detection() {
        let zeroed = OnChainPosition {
            liquidity: U256::zero(),
            fee_growth_inside_0_last: U256::zero(),
            fee_growth_inside_1_last: U256::zero(),
            tokens_owed_0: U256::zero(),
            tokens_owed_1: U256::zero(),
        };
        assert!(zeroed.looks_burned());

        let live = OnChainPosition {
            tokens_owed_1: U256::from(5u64),
            ..zeroed.clone()
        };
        assert!(!live.looks_burned());
    }
}
