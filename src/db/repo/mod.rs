//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `events.rs` - ledger events and APR periods
//! - `orders.rs` - close orders and their atomic state transitions
//!
//! All row-scoped exclusion (refresh/rebuild claims) lives here as atomic
//! single-statement updates, so callers never hold a connection-level lock.

mod events;
mod orders;

use crate::domain::{Address, Decimal, PositionConfig, PositionId, PositionState, TimeMs};
use primitive_types::U256;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

pub(crate) fn decode_u256(row: &SqliteRow, col: &str) -> Result<U256, sqlx::Error> {
    let s: String = row.try_get(col)?;
    U256::from_dec_str(&s).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn decode_decimal(row: &SqliteRow, col: &str) -> Result<Decimal, sqlx::Error> {
    let s: String = row.try_get(col)?;
    Decimal::from_str_canonical(&s).map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn decode_position_id(row: &SqliteRow, col: &str) -> Result<PositionId, sqlx::Error> {
    let s: String = row.try_get(col)?;
    s.parse().map_err(|e: uuid::Error| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

fn decode_position_row(row: &SqliteRow) -> Result<(PositionConfig, PositionState), sqlx::Error> {
    let config_json: String = row.try_get("config_json")?;
    let config: PositionConfig =
        serde_json::from_str(&config_json).map_err(|e| sqlx::Error::ColumnDecode {
            index: "config_json".to_string(),
            source: Box::new(e),
        })?;

    let state = PositionState {
        liquidity: decode_u256(row, "liquidity")?,
        fee_growth_inside_0_last: decode_u256(row, "fee_growth_inside_0_last")?,
        fee_growth_inside_1_last: decode_u256(row, "fee_growth_inside_1_last")?,
        tokens_owed_0: decode_u256(row, "tokens_owed_0")?,
        tokens_owed_1: decode_u256(row, "tokens_owed_1")?,
        cost_basis: decode_decimal(row, "cost_basis")?,
        realized_pnl: decode_decimal(row, "realized_pnl")?,
        collected_fees: decode_decimal(row, "collected_fees")?,
        last_refreshed: row
            .try_get::<Option<i64>, _>("last_refreshed_ms")?
            .map(TimeMs::new),
    };
    Ok((config, state))
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Position rows
    // =========================================================================

    /// Insert a newly-opened position with its initial state.
    pub async fn insert_position(
        &self,
        config: &PositionConfig,
        state: &PositionState,
    ) -> Result<(), sqlx::Error> {
        let config_json =
            serde_json::to_string(config).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO positions (
                position_id, owner, config_json,
                liquidity, fee_growth_inside_0_last, fee_growth_inside_1_last,
                tokens_owed_0, tokens_owed_1,
                cost_basis, realized_pnl, collected_fees, last_refreshed_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.position_id.to_string())
        .bind(config.owner.as_str())
        .bind(config_json)
        .bind(state.liquidity.to_string())
        .bind(state.fee_growth_inside_0_last.to_string())
        .bind(state.fee_growth_inside_1_last.to_string())
        .bind(state.tokens_owed_0.to_string())
        .bind(state.tokens_owed_1.to_string())
        .bind(state.cost_basis.to_canonical_string())
        .bind(state.realized_pnl.to_canonical_string())
        .bind(state.collected_fees.to_canonical_string())
        .bind(state.last_refreshed.map(|t| t.as_ms()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load a position's config and current state.
    pub async fn get_position(
        &self,
        position_id: &PositionId,
    ) -> Result<Option<(PositionConfig, PositionState)>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM positions WHERE position_id = ?")
            .bind(position_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_position_row).transpose()
    }

    /// All positions belonging to an owner.
    pub async fn positions_by_owner(
        &self,
        owner: &Address,
    ) -> Result<Vec<(PositionConfig, PositionState)>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM positions WHERE owner = ? ORDER BY position_id")
            .bind(owner.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_position_row).collect()
    }

    /// Persist refreshed on-chain state, stamping the refresh time.
    pub async fn update_position_state(
        &self,
        position_id: &PositionId,
        state: &PositionState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE positions SET
                liquidity = ?,
                fee_growth_inside_0_last = ?,
                fee_growth_inside_1_last = ?,
                tokens_owed_0 = ?,
                tokens_owed_1 = ?,
                cost_basis = ?,
                realized_pnl = ?,
                collected_fees = ?,
                last_refreshed_ms = ?
            WHERE position_id = ?
            "#,
        )
        .bind(state.liquidity.to_string())
        .bind(state.fee_growth_inside_0_last.to_string())
        .bind(state.fee_growth_inside_1_last.to_string())
        .bind(state.tokens_owed_0.to_string())
        .bind(state.tokens_owed_1.to_string())
        .bind(state.cost_basis.to_canonical_string())
        .bind(state.realized_pnl.to_canonical_string())
        .bind(state.collected_fees.to_canonical_string())
        .bind(state.last_refreshed.map(|t| t.as_ms()))
        .bind(position_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Row-scoped claims
    // =========================================================================

    /// Atomically claim the refresh slot for a position. Returns false when
    /// another refresh is already in flight.
    pub async fn try_claim_refresh(&self, position_id: &PositionId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE positions SET refresh_claim = 1 WHERE position_id = ? AND refresh_claim = 0",
        )
        .bind(position_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn release_refresh(&self, position_id: &PositionId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE positions SET refresh_claim = 0 WHERE position_id = ?")
            .bind(position_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically claim the rebuild slot. A rebuild racing another rebuild
    /// (or a refresh-driven append) must never interleave, so the claim is
    /// held for the rebuild's full duration.
    pub async fn try_claim_rebuild(&self, position_id: &PositionId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE positions SET rebuild_claim = 1 WHERE position_id = ? AND rebuild_claim = 0",
        )
        .bind(position_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn release_rebuild(&self, position_id: &PositionId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE positions SET rebuild_claim = 0 WHERE position_id = ?")
            .bind(position_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Timestamp of the least-recently-refreshed of the owner's positions.
    ///
    /// Positions that were never refreshed count as epoch, so a fresh
    /// portfolio is always allowed through.
    pub async fn oldest_refresh_ms(&self, owner: &Address) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT MIN(COALESCE(last_refreshed_ms, 0)) AS oldest FROM positions WHERE owner = ?",
        )
        .bind(owner.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_get::<Option<i64>, _>("oldest")
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_position_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        let mut state = PositionState::empty();
        state.liquidity = U256::from(123_456u64);
        state.cost_basis = Decimal::from_str_canonical("1000.5").unwrap();

        repo.insert_position(&config, &state).await.unwrap();
        let (loaded_config, loaded_state) = repo
            .get_position(&config.position_id)
            .await
            .unwrap()
            .expect("position should exist");

        assert_eq!(loaded_config, config);
        assert_eq!(loaded_state, state);
    }

    #[tokio::test]
    async fn test_get_position_missing() {
        let (repo, _temp) = setup_repo().await;
        let missing = repo.get_position(&PositionId::generate()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_refresh_claim_is_exclusive() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        assert!(repo.try_claim_refresh(&config.position_id).await.unwrap());
        assert!(!repo.try_claim_refresh(&config.position_id).await.unwrap());

        repo.release_refresh(&config.position_id).await.unwrap();
        assert!(repo.try_claim_refresh(&config.position_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_claim_is_exclusive() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        assert!(repo.try_claim_rebuild(&config.position_id).await.unwrap());
        assert!(!repo.try_claim_rebuild(&config.position_id).await.unwrap());
        repo.release_rebuild(&config.position_id).await.unwrap();
        assert!(repo.try_claim_rebuild(&config.position_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_oldest_refresh_tracks_minimum() {
        let (repo, _temp) = setup_repo().await;
        let owner = Address::new("0xowner");

        let a = sample_config("0xowner");
        let mut state_a = PositionState::empty();
        state_a.last_refreshed = Some(TimeMs::new(5000));
        repo.insert_position(&a, &state_a).await.unwrap();

        let b = sample_config("0xowner");
        let mut state_b = PositionState::empty();
        state_b.last_refreshed = Some(TimeMs::new(9000));
        repo.insert_position(&b, &state_b).await.unwrap();

        assert_eq!(repo.oldest_refresh_ms(&owner).await.unwrap(), Some(5000));
    }

    #[tokio::test]
    async fn test_oldest_refresh_never_refreshed_counts_as_epoch() {
        let (repo, _temp) = setup_repo().await;
        let config = sample_config("0xowner");
        repo.insert_position(&config, &PositionState::empty())
            .await
            .unwrap();

        assert_eq!(
            repo.oldest_refresh_ms(&Address::new("0xowner"))
                .await
                .unwrap(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_oldest_refresh_no_positions() {
        let (repo, _temp) = setup_repo().await;
        assert_eq!(
            repo.oldest_refresh_ms(&Address::new("0xnobody"))
                .await
                .unwrap(),
            None
        );
    }
}
