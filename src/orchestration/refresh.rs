//! Per-position refresh with row-scoped serialization and bulk cooldown.

use crate::chain::PoolPriceSource;
use crate::db::Repository;
use crate::domain::{Address, PositionId, PositionState, TimeMs};
use crate::engine::{derive_status, PositionStatus};
use crate::error::AppError;
use std::sync::Arc;
use tracing::warn;

/// Outcome of one position refresh.
#[derive(Debug, Clone)]
pub struct RefreshResult {
    pub state: PositionState,
    pub status: PositionStatus,
}

pub struct RefreshCoordinator {
    repo: Arc<Repository>,
    prices: Arc<dyn PoolPriceSource>,
    cooldown_ms: i64,
}

impl RefreshCoordinator {
    pub fn new(repo: Arc<Repository>, prices: Arc<dyn PoolPriceSource>, cooldown_ms: i64) -> Self {
        RefreshCoordinator {
            repo,
            prices,
            cooldown_ms,
        }
    }

    /// Refresh one position from chain.
    ///
    /// At most one refresh runs per position: the row claim is atomic, and
    /// a concurrent caller bounces with a short retry-after instead of
    /// queueing behind chain I/O.
    pub async fn refresh(&self, position_id: &PositionId) -> Result<RefreshResult, AppError> {
        let Some((config, state)) = self.repo.get_position(position_id).await? else {
            return Err(AppError::NotFound(format!("position {}", position_id)));
        };

        if !self.repo.try_claim_refresh(position_id).await? {
            return Err(AppError::RateLimited { retry_after_secs: 1 });
        }

        let result = self.refresh_inner(position_id, &config, state).await;
        if let Err(e) = self.repo.release_refresh(position_id).await {
            warn!(position = %position_id, error = %e, "failed to release refresh claim");
        }
        result
    }

    async fn refresh_inner(
        &self,
        position_id: &PositionId,
        config: &crate::domain::PositionConfig,
        stored: PositionState,
    ) -> Result<RefreshResult, AppError> {
        let pool = self
            .prices
            .fetch_pool_state(
                config.chain_id,
                &config.pool_address,
                (config.tick_lower, config.tick_upper),
                None,
            )
            .await?;

        let onchain = self.prices.fetch_position(config).await?;
        if onchain.looks_burned() {
            return Err(AppError::DataCorrupt(format!(
                "position {} reads all-zero on chain (burned NFT or bad snapshot)",
                position_id
            )));
        }

        // Chain fields replace; ledger aggregates carry over.
        let state = PositionState {
            liquidity: onchain.liquidity,
            fee_growth_inside_0_last: onchain.fee_growth_inside_0_last,
            fee_growth_inside_1_last: onchain.fee_growth_inside_1_last,
            tokens_owed_0: onchain.tokens_owed_0,
            tokens_owed_1: onchain.tokens_owed_1,
            cost_basis: stored.cost_basis,
            realized_pnl: stored.realized_pnl,
            collected_fees: stored.collected_fees,
            last_refreshed: Some(TimeMs::now()),
        };

        let status = derive_status(config, &state, &pool)?;
        self.repo.update_position_state(position_id, &state).await?;

        Ok(RefreshResult { state, status })
    }

    /// Refresh every position an owner holds.
    ///
    /// Throttled on the least-recently-refreshed position: inside the
    /// cooldown the whole request bounces with a computed retry-after.
    pub async fn refresh_all(
        &self,
        owner: &Address,
    ) -> Result<Vec<(PositionId, Result<RefreshResult, AppError>)>, AppError> {
        let Some(oldest_ms) = self.repo.oldest_refresh_ms(owner).await? else {
            return Err(AppError::NotFound(format!("no positions for {}", owner)));
        };

        let elapsed = TimeMs::now().since(TimeMs::new(oldest_ms));
        if elapsed < self.cooldown_ms {
            return Err(AppError::RateLimited {
                retry_after_secs: (self.cooldown_ms - elapsed) / 1000,
            });
        }

        // Positions refresh concurrently; each one is still serialized by
        // its own row claim.
        let positions = self.repo.positions_by_owner(owner).await?;
        let outcomes = futures::future::join_all(
            positions
                .iter()
                .map(|(config, _)| self.refresh(&config.position_id)),
        )
        .await;

        Ok(positions
            .into_iter()
            .map(|(config, _)| config.position_id)
            .zip(outcomes)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{MockChainSource, OnChainPosition};
    use crate::db::repo::test_support::{sample_config, setup_repo};
    use crate::domain::PoolState;
    use crate::math::sqrt_price_at_tick;
    use primitive_types::U256;

    fn pool_at(tick: i32) -> PoolState {
        PoolState {
            sqrt_price_x96: sqrt_price_at_tick(tick).unwrap(),
            current_tick: tick,
            liquidity: 0,
            fee_growth_global_0: U256::zero(),
            fee_growth_global_1: U256::zero(),
            fee_growth_inside_0: U256::zero(),
            fee_growth_inside_1: U256::zero(),
            observed_at: TimeMs::new(0),
        }
    }

    fn live_position(liquidity: u64) -> OnChainPosition {
        OnChainPosition {
            liquidity: U256::from(liquidity),
            fee_growth_inside_0_last: U256::zero(),
            fee_growth_inside_1_last: U256::zero(),
            tokens_owed_0: U256::from(1u64),
            tokens_owed_1: U256::zero(),
        }
    }

    #[tokio::test]
    async fn test_refresh_updates_state_from_chain() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        let chain = Arc::new(
            MockChainSource::new().with_pool_state(pool_at(200_120)),
        );
        chain.set_position(live_position(5_000_000));

        let coordinator = RefreshCoordinator::new(repo.clone(), chain, 60_000);
        let result = coordinator.refresh(&config.position_id).await.unwrap();

        assert_eq!(result.state.liquidity, U256::from(5_000_000u64));
        assert!(result.state.last_refreshed.is_some());
        assert_eq!(
            result.status.phase,
            crate::domain::RangePhase::InRange
        );

        let (_, stored) = repo.get_position(&config.position_id).await.unwrap().unwrap();
        assert_eq!(stored.liquidity, U256::from(5_000_000u64));
    }

    #[tokio::test]
    async fn test_refresh_unknown_position() {
        let (repo, _temp) = setup_repo().await;
        let chain = Arc::new(MockChainSource::new());
        let coordinator = RefreshCoordinator::new(repo, chain, 60_000);

        let err = coordinator.refresh(&PositionId::generate()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_refresh_chain_failure_releases_claim() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        let chain = Arc::new(MockChainSource::new().with_pool_state(pool_at(200_120)));
        chain.set_position(live_position(1));
        chain.fail_next_pool_fetch(crate::chain::ChainSourceError::Network("down".into()));

        let coordinator = RefreshCoordinator::new(repo.clone(), chain, 60_000);
        let err = coordinator.refresh(&config.position_id).await.unwrap_err();
        assert!(matches!(err, AppError::ChainUnavailable(_)));

        // Claim was released: the next refresh goes through.
        assert!(coordinator.refresh(&config.position_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_burned_position_is_data_corrupt() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        let chain = Arc::new(MockChainSource::new().with_pool_state(pool_at(200_120)));
        chain.set_position(OnChainPosition {
            liquidity: U256::zero(),
            fee_growth_inside_0_last: U256::zero(),
            fee_growth_inside_1_last: U256::zero(),
            tokens_owed_0: U256::zero(),
            tokens_owed_1: U256::zero(),
        });

        let coordinator = RefreshCoordinator::new(repo, chain, 60_000);
        let err = coordinator.refresh(&config.position_id).await.unwrap_err();
        assert!(matches!(err, AppError::DataCorrupt(_)));
    }

    #[tokio::test]
    async fn test_bulk_refresh_inside_cooldown_computes_retry_after() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        let mut state = PositionState::empty();
        // Refreshed 10 seconds ago.
        state.last_refreshed = Some(TimeMs::new(TimeMs::now().as_ms() - 10_000));
        repo.insert_position(&config, &state).await.unwrap();

        let chain = Arc::new(MockChainSource::new());
        let coordinator = RefreshCoordinator::new(repo, chain, 60_000);

        let err = coordinator
            .refresh_all(&Address::new("0xowner"))
            .await
            .unwrap_err();
        match err {
            AppError::RateLimited { retry_after_secs } => {
                assert!(
                    (49..=50).contains(&retry_after_secs),
                    "expected ~50s, got {}",
                    retry_after_secs
                );
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bulk_refresh_after_cooldown_refreshes_all() {
        let (repo, _temp) = setup_repo().await;
        let config_a = sample_config("0xowner");
        let config_b = sample_config("0xowner");
        let mut stale = PositionState::empty();
        stale.last_refreshed = Some(TimeMs::new(TimeMs::now().as_ms() - 120_000));
        repo.insert_position(&config_a, &stale).await.unwrap();
        repo.insert_position(&config_b, &stale).await.unwrap();

        let chain = Arc::new(MockChainSource::new().with_pool_state(pool_at(200_120)));
        chain.set_position(live_position(42));

        let coordinator = RefreshCoordinator::new(repo, chain, 60_000);
        let results = coordinator
            .refresh_all(&Address::new("0xowner"))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn test_bulk_refresh_no_positions() {
        let (repo, _temp) = setup_repo().await;
        let chain = Arc::new(MockChainSource::new());
        let coordinator = RefreshCoordinator::new(repo, chain, 60_000);
        let err = coordinator
            .refresh_all(&Address::new("0xnobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
