//! HTTP chain source backed by a position indexer node.

use super::{
    ChainSourceError, OnChainPosition, OrderStatusSource, PoolPriceSource, RawEventSource,
};
use crate::domain::{
    Address, ChainId, ChainPosition, EventKind, OnChainStatus, PoolState, PositionConfig,
    RawPositionEvent, TimeMs,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use primitive_types::U256;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Chain source speaking the indexer's JSON query protocol.
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    client: Client,
    base_url: String,
}

impl HttpChainSource {
    /// Create a source against `base_url` with a per-request timeout.
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
        }
    }

    async fn post_query(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, ChainSourceError> {
        let url = format!("{}/query", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(20)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ChainSourceError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ChainSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ChainSourceError::Http {
                    status: status.as_u16(),
                    message: "server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ChainSourceError::Http {
                    status: status.as_u16(),
                    message: "client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ChainSourceError::Parse(e.to_string())))
        })
        .await
    }
}

fn field<'a>(
    value: &'a serde_json::Value,
    name: &str,
) -> Result<&'a serde_json::Value, ChainSourceError> {
    value
        .get(name)
        .ok_or_else(|| ChainSourceError::Parse(format!("missing field: {}", name)))
}

fn parse_u256(value: &serde_json::Value, name: &str) -> Result<U256, ChainSourceError> {
    let s = field(value, name)?
        .as_str()
        .ok_or_else(|| ChainSourceError::Parse(format!("{} must be a decimal string", name)))?;
    U256::from_dec_str(s).map_err(|e| ChainSourceError::Parse(format!("invalid {}: {:?}", name, e)))
}

fn parse_i64(value: &serde_json::Value, name: &str) -> Result<i64, ChainSourceError> {
    field(value, name)?
        .as_i64()
        .ok_or_else(|| ChainSourceError::Parse(format!("{} must be an integer", name)))
}

fn parse_pool_state(value: &serde_json::Value) -> Result<PoolState, ChainSourceError> {
    Ok(PoolState {
        sqrt_price_x96: parse_u256(value, "sqrtPriceX96")?,
        current_tick: parse_i64(value, "tick")? as i32,
        liquidity: parse_u256(value, "liquidity")?
            .try_into()
            .map_err(|_| ChainSourceError::Parse("liquidity exceeds u128".to_string()))?,
        fee_growth_global_0: parse_u256(value, "feeGrowthGlobal0")?,
        fee_growth_global_1: parse_u256(value, "feeGrowthGlobal1")?,
        fee_growth_inside_0: parse_u256(value, "feeGrowthInside0")?,
        fee_growth_inside_1: parse_u256(value, "feeGrowthInside1")?,
        observed_at: TimeMs::new(parse_i64(value, "observedAt")?),
    })
}

fn parse_event(value: &serde_json::Value) -> Result<RawPositionEvent, ChainSourceError> {
    let kind_str = field(value, "kind")?
        .as_str()
        .ok_or_else(|| ChainSourceError::Parse("kind must be a string".to_string()))?;
    let kind: EventKind = kind_str
        .parse()
        .map_err(ChainSourceError::Parse)?;

    Ok(RawPositionEvent {
        kind,
        chain_pos: ChainPosition {
            block_number: parse_i64(value, "blockNumber")? as u64,
            tx_index: parse_i64(value, "txIndex")? as u32,
            log_index: parse_i64(value, "logIndex")? as u32,
        },
        time_ms: TimeMs::new(parse_i64(value, "timeMs")?),
        amount0: parse_u256(value, "amount0")?,
        amount1: parse_u256(value, "amount1")?,
        liquidity_delta: parse_u256(value, "liquidityDelta")?,
        sqrt_price_x96: parse_u256(value, "sqrtPriceX96")?,
    })
}

#[async_trait]
impl PoolPriceSource for HttpChainSource {
    async fn fetch_pool_state(
        &self,
        chain_id: ChainId,
        pool: &Address,
        tick_range: (i32, i32),
        at_block: Option<u64>,
    ) -> Result<PoolState, ChainSourceError> {
        debug!(chain = %chain_id, pool = %pool, "fetching pool state");

        let mut payload = serde_json::json!({
            "type": "poolState",
            "chainId": chain_id.as_u64(),
            "pool": pool.as_str(),
            "tickLower": tick_range.0,
            "tickUpper": tick_range.1,
        });
        if let Some(block) = at_block {
            payload["block"] = serde_json::json!(block);
        }

        let response = self.post_query(payload).await?;
        parse_pool_state(&response)
    }

    async fn fetch_position(
        &self,
        config: &PositionConfig,
    ) -> Result<OnChainPosition, ChainSourceError> {
        let payload = serde_json::json!({
            "type": "positionState",
            "chainId": config.chain_id.as_u64(),
            "pool": config.pool_address.as_str(),
            "tickLower": config.tick_lower,
            "tickUpper": config.tick_upper,
            "owner": config.owner.as_str(),
        });

        let response = self.post_query(payload).await?;
        Ok(OnChainPosition {
            liquidity: parse_u256(&response, "liquidity")?,
            fee_growth_inside_0_last: parse_u256(&response, "feeGrowthInside0Last")?,
            fee_growth_inside_1_last: parse_u256(&response, "feeGrowthInside1Last")?,
            tokens_owed_0: parse_u256(&response, "tokensOwed0")?,
            tokens_owed_1: parse_u256(&response, "tokensOwed1")?,
        })
    }
}

#[async_trait]
impl RawEventSource for HttpChainSource {
    async fn fetch_events(
        &self,
        config: &PositionConfig,
    ) -> Result<Vec<RawPositionEvent>, ChainSourceError> {
        debug!(position = %config.position_id, "fetching raw position events");

        let payload = serde_json::json!({
            "type": "positionEvents",
            "chainId": config.chain_id.as_u64(),
            "pool": config.pool_address.as_str(),
            "tickLower": config.tick_lower,
            "tickUpper": config.tick_upper,
            "owner": config.owner.as_str(),
        });

        let response = self.post_query(payload).await?;
        let items = response
            .as_array()
            .ok_or_else(|| ChainSourceError::Parse("expected array response".to_string()))?;

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            match parse_event(item) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(position = %config.position_id, error = %e, "skipping unparseable event");
                }
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl OrderStatusSource for HttpChainSource {
    async fn fetch_order_status(
        &self,
        chain_id: ChainId,
        order_hash: &str,
    ) -> Result<OnChainStatus, ChainSourceError> {
        let payload = serde_json::json!({
            "type": "orderStatus",
            "chainId": chain_id.as_u64(),
            "orderHash": order_hash,
        });

        let response = self.post_query(payload).await?;
        let status = field(&response, "status")?
            .as_str()
            .ok_or_else(|| ChainSourceError::Parse("status must be a string".to_string()))?;
        match status {
            "NONE" => Ok(OnChainStatus::None),
            "ACTIVE" => Ok(OnChainStatus::Active),
            "EXECUTED" => Ok(OnChainStatus::Executed),
            "CANCELLED" => Ok(OnChainStatus::Cancelled),
            other => Err(ChainSourceError::Parse(format!(
                "unknown order status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pool_state_valid() {
        let json = serde_json::json!({
            "sqrtPriceX96": "79228162514264337593543950336",
            "tick": 0,
            "liquidity": "1000000000000",
            "feeGrowthGlobal0": "0",
            "feeGrowthGlobal1": "0",
            "feeGrowthInside0": "0",
            "feeGrowthInside1": "0",
            "observedAt": 1700000000000i64,
        });
        let state = parse_pool_state(&json).unwrap();
        assert_eq!(state.current_tick, 0);
        assert_eq!(state.sqrt_price_x96, U256::one() << 96);
        assert_eq!(state.liquidity, 1_000_000_000_000u128);
    }

    #[test]
    fn test_parse_pool_state_missing_field() {
        let json = serde_json::json!({ "tick": 0 });
        assert!(matches!(
            parse_pool_state(&json),
            Err(ChainSourceError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_event_valid() {
        let json = serde_json::json!({
            "kind": "INCREASE",
            "blockNumber": 100,
            "txIndex": 2,
            "logIndex": 5,
            "timeMs": 1700000000000i64,
            "amount0": "400",
            "amount1": "600",
            "liquidityDelta": "1000",
            "sqrtPriceX96": "79228162514264337593543950336",
        });
        let event = parse_event(&json).unwrap();
        assert_eq!(event.kind, EventKind::Increase);
        assert_eq!(event.chain_pos.block_number, 100);
        assert_eq!(event.amount1, U256::from(600u64));
    }

    #[test]
    fn test_parse_event_bad_kind() {
        let json = serde_json::json!({
            "kind": "MINT",
            "blockNumber": 100,
            "txIndex": 0,
            "logIndex": 0,
            "timeMs": 0,
            "amount0": "0",
            "amount1": "0",
            "liquidityDelta": "0",
            "sqrtPriceX96": "1",
        });
        assert!(matches!(parse_event(&json), Err(ChainSourceError::Parse(_))));
    }
}
