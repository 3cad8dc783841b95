//! Ledger rebuild: stage in memory, commit atomically.
//!
//! The rebuild deletes and regenerates a position's entire derived ledger.
//! The whole raw stream is fetched and replayed before any row is touched,
//! so an upstream failure mid-fetch (rate limiting included) leaves the
//! previous ledger fully intact. The delete+insert runs in one database
//! transaction under the position's exclusive rebuild claim.

use crate::chain::RawEventSource;
use crate::db::Repository;
use crate::domain::{PositionId, PositionState, TimeMs};
use crate::engine::{build_apr_periods, summarize, AprSummary, LedgerReplay};
use crate::error::AppError;
use std::sync::Arc;
use tracing::{info, warn};

/// Full output of a rebuild, newest event first (listing order).
#[derive(Debug, Clone)]
pub struct RebuildResult {
    pub events: Vec<crate::domain::LedgerEvent>,
    pub summary: AprSummary,
    pub state: PositionState,
}

pub struct LedgerRebuilder {
    repo: Arc<Repository>,
    events: Arc<dyn RawEventSource>,
}

impl LedgerRebuilder {
    pub fn new(repo: Arc<Repository>, events: Arc<dyn RawEventSource>) -> Self {
        LedgerRebuilder { repo, events }
    }

    /// Rebuild a position's ledger from genesis.
    ///
    /// Idempotent: the same upstream events produce byte-identical ledger
    /// rows, so re-running a rebuild is always safe.
    pub async fn rebuild(&self, position_id: &PositionId) -> Result<RebuildResult, AppError> {
        let Some((config, state)) = self.repo.get_position(position_id).await? else {
            return Err(AppError::NotFound(format!("position {}", position_id)));
        };

        if !self.repo.try_claim_rebuild(position_id).await? {
            return Err(AppError::RateLimited { retry_after_secs: 1 });
        }

        let result = self.rebuild_inner(position_id, &config, state).await;
        if let Err(e) = self.repo.release_rebuild(position_id).await {
            warn!(position = %position_id, error = %e, "failed to release rebuild claim");
        }
        result
    }

    async fn rebuild_inner(
        &self,
        position_id: &PositionId,
        config: &crate::domain::PositionConfig,
        stored: PositionState,
    ) -> Result<RebuildResult, AppError> {
        // Stage: everything below happens in memory.
        let raw = self.events.fetch_events(config).await?;
        let fetched = raw.len();
        let output = LedgerReplay::replay(config, raw)?;

        let cutoff = TimeMs::now();
        let periods = build_apr_periods(&output.events, cutoff);

        let state = PositionState {
            liquidity: output.liquidity,
            cost_basis: output.cost_basis,
            realized_pnl: output.realized_pnl,
            collected_fees: output.collected_fees,
            ..stored
        };

        // Commit: one transaction replaces events, periods and aggregates.
        self.repo
            .replace_ledger_atomic(position_id, &output.events, &periods, &state)
            .await?;

        info!(
            position = %position_id,
            events = fetched,
            periods = periods.len(),
            "ledger rebuilt"
        );

        let mut events = output.events;
        events.reverse();
        Ok(RebuildResult {
            events,
            summary: summarize(periods),
            state,
        })
    }
}
