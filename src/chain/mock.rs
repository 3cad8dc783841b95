//! Mock chain source for tests: scripted state, no network.

use super::{
    ChainSourceError, OnChainPosition, OrderStatusSource, PoolPriceSource, RawEventSource,
};
use crate::domain::{
    Address, ChainId, OnChainStatus, PoolState, PositionConfig, RawPositionEvent,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mock chain source with mutable scripted responses.
///
/// State lives behind a mutex so tests can evolve the chain mid-scenario
/// (move the price, execute an order) through a shared `Arc`.
#[derive(Debug, Default)]
pub struct MockChainSource {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pool_state: Option<PoolState>,
    position: Option<OnChainPosition>,
    events: Vec<RawPositionEvent>,
    order_statuses: HashMap<String, OnChainStatus>,
    fail_pool_next: Option<ChainSourceError>,
    fail_events_next: Option<ChainSourceError>,
    event_fetches: u32,
}

impl MockChainSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_state(self, state: PoolState) -> Self {
        self.set_pool_state(state);
        self
    }

    pub fn with_position(self, position: OnChainPosition) -> Self {
        self.inner.lock().unwrap().position = Some(position);
        self
    }

    pub fn with_events(self, events: Vec<RawPositionEvent>) -> Self {
        self.inner.lock().unwrap().events = events;
        self
    }

    /// Replace the pool state returned by subsequent fetches.
    pub fn set_pool_state(&self, state: PoolState) {
        self.inner.lock().unwrap().pool_state = Some(state);
    }

    pub fn set_position(&self, position: OnChainPosition) {
        self.inner.lock().unwrap().position = Some(position);
    }

    pub fn set_events(&self, events: Vec<RawPositionEvent>) {
        self.inner.lock().unwrap().events = events;
    }

    pub fn set_order_status(&self, order_hash: &str, status: OnChainStatus) {
        self.inner
            .lock()
            .unwrap()
            .order_statuses
            .insert(order_hash.to_string(), status);
    }

    /// Make the next pool-state fetch fail with `error`, then recover.
    pub fn fail_next_pool_fetch(&self, error: ChainSourceError) {
        self.inner.lock().unwrap().fail_pool_next = Some(error);
    }

    /// Make the next event fetch fail with `error`, then recover.
    pub fn fail_next_event_fetch(&self, error: ChainSourceError) {
        self.inner.lock().unwrap().fail_events_next = Some(error);
    }

    /// How many times the event stream was fetched.
    pub fn event_fetch_count(&self) -> u32 {
        self.inner.lock().unwrap().event_fetches
    }
}

#[async_trait]
impl PoolPriceSource for MockChainSource {
    async fn fetch_pool_state(
        &self,
        _chain_id: ChainId,
        _pool: &Address,
        _tick_range: (i32, i32),
        _at_block: Option<u64>,
    ) -> Result<PoolState, ChainSourceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_pool_next.take() {
            return Err(error);
        }
        inner
            .pool_state
            .clone()
            .ok_or_else(|| ChainSourceError::Network("mock: no pool state scripted".to_string()))
    }

    async fn fetch_position(
        &self,
        _config: &PositionConfig,
    ) -> Result<OnChainPosition, ChainSourceError> {
        self.inner
            .lock()
            .unwrap()
            .position
            .clone()
            .ok_or_else(|| ChainSourceError::Network("mock: no position scripted".to_string()))
    }
}

#[async_trait]
impl RawEventSource for MockChainSource {
    async fn fetch_events(
        &self,
        _config: &PositionConfig,
    ) -> Result<Vec<RawPositionEvent>, ChainSourceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.event_fetches += 1;
        if let Some(error) = inner.fail_events_next.take() {
            return Err(error);
        }
        Ok(inner.events.clone())
    }
}

#[async_trait]
impl OrderStatusSource for MockChainSource {
    async fn fetch_order_status(
        &self,
        _chain_id: ChainId,
        order_hash: &str,
    ) -> Result<OnChainStatus, ChainSourceError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .order_statuses
            .get(order_hash)
            .copied()
            .unwrap_or(OnChainStatus::Active))
    }
}
