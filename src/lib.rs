pub mod api;
pub mod chain;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod math;
pub mod orchestration;
pub mod orders;
pub mod signing;

pub use chain::{
    ChainSourceError, HttpChainSource, MockChainSource, OnChainPosition, OrderStatusSource,
    PoolPriceSource, RawEventSource,
};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Address, AutomationState, ChainId, CloseOrder, Currency, Decimal, EventKind, LedgerEvent,
    OnChainStatus, OrderKind, PoolState, PositionConfig, PositionId, PositionState,
    RangePhase, RawPositionEvent, SwapIntent, TimeMs, TriggerMode,
};
pub use error::AppError;
pub use orchestration::{LedgerRebuilder, RefreshCoordinator};
pub use orders::OrderMonitor;
pub use signing::{IntentStore, MockIntentStore, MockSigner, Signer, StrategyIntent};
