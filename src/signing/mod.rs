//! Signer and strategy-intent abstractions.
//!
//! Signing never happens inside this service: the close-order machine
//! builds a calldata intent and delegates. The signer is treated as
//! fallible and slow; every call is timeout-guarded by the caller.

use crate::domain::{Address, TimeMs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod mock;

pub use mock::{MockIntentStore, MockSigner};

/// Calldata intent handed to the signer for one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Immutable order identity.
    pub order_hash: String,
    /// Stable per-attempt token; a rebroadcast with the same key must not
    /// execute twice.
    pub idempotency_key: String,
    /// ABI-encoded close call for the automation contract.
    pub calldata: String,
}

#[derive(Debug, Clone, Error)]
pub enum SignerError {
    /// Signer refused the request (policy, malformed calldata).
    #[error("signer rejected: {0}")]
    Rejected(String),
    /// Broadcast failed or simulation reverted; retryable.
    #[error("broadcast failed: {0}")]
    Broadcast(String),
    /// Signer did not answer within the attempt timeout.
    #[error("signer timed out")]
    Timeout,
}

/// External transaction signer.
#[async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    /// Sign and broadcast; returns the transaction hash.
    async fn submit(&self, request: &ExecutionRequest) -> Result<String, SignerError>;
}

/// Effects a strategy intent may permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentEffect {
    /// Withdraw liquidity back to the owner.
    ClosePosition,
    /// Swap withdrawn legs into another currency.
    SwapOnClose,
}

/// The currently-valid signed strategy intent: what the user has
/// pre-authorized automation to do, and with which currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyIntent {
    pub allowed_currencies: Vec<Address>,
    pub allowed_effects: Vec<IntentEffect>,
    pub valid_until: TimeMs,
}

impl StrategyIntent {
    pub fn is_valid_at(&self, now: TimeMs) -> bool {
        now <= self.valid_until
    }

    pub fn permits_currency(&self, currency: &Address) -> bool {
        self.allowed_currencies.contains(currency)
    }

    pub fn permits_effect(&self, effect: IntentEffect) -> bool {
        self.allowed_effects.contains(&effect)
    }
}

/// Store of the user's currently-valid signed strategy intent.
#[async_trait]
pub trait IntentStore: Send + Sync + fmt::Debug {
    /// Fetch the intent covering `owner`, if one is currently valid.
    async fn current_intent(&self, owner: &Address) -> Option<StrategyIntent>;
}
