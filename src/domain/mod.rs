//! Domain types shared across the engine, orchestration and API layers.

pub mod currency;
pub mod decimal;
pub mod event;
pub mod order;
pub mod pool;
pub mod primitives;

pub use currency::Currency;
pub use decimal::Decimal;
pub use event::{sort_events_for_replay, ChainPosition, EventKind, LedgerEvent, RawPositionEvent};
pub use order::{
    AutomationState, CloseOrder, OnChainStatus, OrderKind, SwapIntent, TriggerMode,
};
pub use pool::{PoolProtocol, PoolState, PositionConfig, PositionState, RangePhase};
pub use primitives::{Address, ChainId, PositionId, TimeMs};
