//! Close-order poll loop and execution driver.
//!
//! The monitor batches evaluation across all open orders. Every lifecycle
//! transition is an atomic CAS in the repository, and execution is driven
//! from current on-chain truth each pass: a crash between "decide" and
//! "persist" costs nothing worse than a re-evaluation, and a retried
//! broadcast reuses its attempt's idempotency key so it cannot
//! double-execute.

use super::lifecycle::{
    build_execution_request, check_compliance, plan_after_failure, retry_due, FailurePlan,
};
use super::AppliedTransition;
use crate::chain::{OrderStatusSource, PoolPriceSource};
use crate::db::Repository;
use crate::domain::{
    Address, AutomationState, ChainId, CloseOrder, OnChainStatus, OrderKind, PositionConfig,
    PositionId, TimeMs,
};
use crate::error::AppError;
use crate::signing::{IntentStore, Signer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct OrderMonitor {
    repo: Arc<Repository>,
    prices: Arc<dyn PoolPriceSource>,
    statuses: Arc<dyn OrderStatusSource>,
    signer: Arc<dyn Signer>,
    intents: Arc<dyn IntentStore>,
    retry_ceiling: u32,
    retry_backoff_ms: i64,
    attempt_timeout: Duration,
}

impl OrderMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<Repository>,
        prices: Arc<dyn PoolPriceSource>,
        statuses: Arc<dyn OrderStatusSource>,
        signer: Arc<dyn Signer>,
        intents: Arc<dyn IntentStore>,
        retry_ceiling: u32,
        retry_backoff_ms: i64,
        attempt_timeout: Duration,
    ) -> Self {
        OrderMonitor {
            repo,
            prices,
            statuses,
            signer,
            intents,
            retry_ceiling,
            retry_backoff_ms,
            attempt_timeout,
        }
    }

    /// Run the poll loop forever.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(transitions) => {
                    for t in &transitions {
                        info!(
                            position = %t.position_id,
                            kind = ?t.kind,
                            from = %t.from,
                            to = %t.to,
                            reason = t.reason.as_deref().unwrap_or(""),
                            "close order transition"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "order poll failed"),
            }
        }
    }

    /// One batched pass over all open orders against live pool ticks.
    pub async fn poll_once(&self) -> Result<Vec<AppliedTransition>, AppError> {
        let orders = self.repo.list_close_orders().await?;
        let mut tick_cache: HashMap<(ChainId, Address), Option<i32>> = HashMap::new();
        let mut applied = Vec::new();

        for order in orders {
            let Some((config, _)) = self.repo.get_position(&order.position_id).await? else {
                warn!(position = %order.position_id, "order references unknown position");
                continue;
            };

            // One price read per pool per pass.
            let cache_key = (config.chain_id, config.pool_address.clone());
            let live_tick = match tick_cache.get(&cache_key) {
                Some(tick) => *tick,
                None => {
                    let tick = match self
                        .prices
                        .fetch_pool_state(
                            config.chain_id,
                            &config.pool_address,
                            (config.tick_lower, config.tick_upper),
                            None,
                        )
                        .await
                    {
                        Ok(state) => Some(state.current_tick),
                        Err(e) => {
                            warn!(pool = %config.pool_address, error = %e, "pool tick unavailable");
                            None
                        }
                    };
                    tick_cache.insert(cache_key, tick);
                    tick
                }
            };

            applied.extend(self.process_order(order, &config, live_tick).await?);
        }
        Ok(applied)
    }

    /// Evaluate all open orders against a caller-supplied tick.
    ///
    /// The observability entry point behind `evaluateOrders`: same machine,
    /// no price fetch.
    pub async fn evaluate_at_tick(&self, tick: i32) -> Result<Vec<AppliedTransition>, AppError> {
        let orders = self.repo.list_close_orders().await?;
        let mut applied = Vec::new();
        for order in orders {
            let Some((config, _)) = self.repo.get_position(&order.position_id).await? else {
                continue;
            };
            applied.extend(self.process_order(order, &config, Some(tick)).await?);
        }
        Ok(applied)
    }

    /// Explicit user cancellation. Wins races with an in-flight transition
    /// because execution re-checks on-chain status and row liveness right
    /// before broadcast; an already-broadcast transaction is only observed.
    pub async fn cancel_order(
        &self,
        position_id: &PositionId,
        kind: OrderKind,
    ) -> Result<bool, AppError> {
        Ok(self.repo.purge_order(position_id, kind).await?)
    }

    async fn process_order(
        &self,
        order: CloseOrder,
        config: &PositionConfig,
        live_tick: Option<i32>,
    ) -> Result<Vec<AppliedTransition>, AppError> {
        let now = TimeMs::now();
        let mut applied = Vec::new();

        if order.state.is_terminal() {
            return Ok(applied);
        }

        // Mirror on-chain truth before anything else: executed and
        // cancelled orders leave live storage regardless of local state.
        match self
            .statuses
            .fetch_order_status(config.chain_id, &order.order_hash)
            .await
        {
            Ok(OnChainStatus::Executed) => {
                if self.repo.purge_order(&order.position_id, order.kind).await? {
                    applied.push(
                        AppliedTransition::new(&order, order.state.as_str(), "executed")
                            .with_reason("confirmed on-chain"),
                    );
                }
                return Ok(applied);
            }
            Ok(OnChainStatus::Cancelled) => {
                if self.repo.purge_order(&order.position_id, order.kind).await? {
                    applied.push(
                        AppliedTransition::new(&order, order.state.as_str(), "cancelled")
                            .with_reason("observed on-chain CANCELLED"),
                    );
                }
                return Ok(applied);
            }
            Ok(OnChainStatus::None) => {
                if self.repo.purge_order(&order.position_id, order.kind).await? {
                    applied.push(
                        AppliedTransition::new(&order, order.state.as_str(), "cancelled")
                            .with_reason("on-chain order missing"),
                    );
                }
                return Ok(applied);
            }
            Ok(OnChainStatus::Active) => {}
            Err(e) => {
                // Status unknown: leave the order alone rather than act on
                // stale local state.
                warn!(order = %order.order_hash, error = %e, "order status unavailable");
                return Ok(applied);
            }
        }

        match order.state {
            AutomationState::Monitoring => {
                let Some(tick) = live_tick else {
                    return Ok(applied);
                };
                if !order.trigger_mode.is_crossed(tick, order.trigger_tick) {
                    return Ok(applied);
                }
                // Persist the decision before any execution I/O.
                if !self
                    .repo
                    .transition_order(
                        &order.position_id,
                        order.kind,
                        AutomationState::Monitoring,
                        AutomationState::Executing,
                    )
                    .await?
                {
                    return Ok(applied);
                }
                applied.push(
                    AppliedTransition::new(&order, "monitoring", "executing")
                        .with_reason(format!("tick {} crossed trigger {}", tick, order.trigger_tick)),
                );
                applied.extend(self.execute_attempt(&order, config, now).await?);
            }
            AutomationState::Executing => {
                // Crash recovery: a row persisted as executing with no task
                // attached. On-chain says still ACTIVE, so drive the attempt
                // again under the same idempotency key.
                applied.extend(self.execute_attempt(&order, config, now).await?);
            }
            AutomationState::Retrying => {
                if !retry_due(&order, now) {
                    return Ok(applied);
                }
                if !self
                    .repo
                    .transition_order(
                        &order.position_id,
                        order.kind,
                        AutomationState::Retrying,
                        AutomationState::Executing,
                    )
                    .await?
                {
                    return Ok(applied);
                }
                applied.push(
                    AppliedTransition::new(&order, "retrying", "executing")
                        .with_reason("backoff elapsed"),
                );
                applied.extend(self.execute_attempt(&order, config, now).await?);
            }
            AutomationState::Failed => {}
        }
        Ok(applied)
    }

    /// Drive one execution attempt. The only place blocking external I/O
    /// happens, and it holds no claim beyond this single attempt.
    async fn execute_attempt(
        &self,
        order: &CloseOrder,
        config: &PositionConfig,
        now: TimeMs,
    ) -> Result<Vec<AppliedTransition>, AppError> {
        let attempt = order.attempts + 1;
        let mut applied = Vec::new();

        // Compliance gate: never reaches the signer on failure.
        let intent = self.intents.current_intent(&config.owner).await;
        if let Err(reason) = check_compliance(order, intent.as_ref(), now) {
            if self
                .repo
                .mark_order_failed(&order.position_id, order.kind, order.attempts, &reason)
                .await?
            {
                applied.push(
                    AppliedTransition::new(order, "executing", "failed").with_reason(reason),
                );
            }
            return Ok(applied);
        }

        // Cancellation wins races: re-check immediately before broadcast.
        match self
            .statuses
            .fetch_order_status(config.chain_id, &order.order_hash)
            .await
        {
            Ok(OnChainStatus::Active) => {}
            Ok(status) => {
                let to = if status == OnChainStatus::Executed {
                    "executed"
                } else {
                    "cancelled"
                };
                if self.repo.purge_order(&order.position_id, order.kind).await? {
                    applied.push(
                        AppliedTransition::new(order, "executing", to)
                            .with_reason("pre-broadcast status check"),
                    );
                }
                return Ok(applied);
            }
            Err(e) => {
                applied.extend(
                    self.handle_attempt_failure(order, attempt, now, &e.to_string())
                        .await?,
                );
                return Ok(applied);
            }
        }

        let request = build_execution_request(order, config, attempt);
        let outcome = tokio::time::timeout(self.attempt_timeout, self.signer.submit(&request)).await;

        match outcome {
            Ok(Ok(tx_hash)) => {
                // Broadcast accepted; executed only once the chain confirms.
                match self
                    .statuses
                    .fetch_order_status(config.chain_id, &order.order_hash)
                    .await
                {
                    Ok(OnChainStatus::Executed) => {
                        if self.repo.purge_order(&order.position_id, order.kind).await? {
                            applied.push(
                                AppliedTransition::new(order, "executing", "executed")
                                    .with_attempt(attempt)
                                    .with_tx_hash(tx_hash),
                            );
                        }
                    }
                    _ => {
                        // Stays executing; the next pass re-drives under the
                        // same idempotency key until the chain answers.
                        applied.push(
                            AppliedTransition::new(order, "executing", "executing")
                                .with_attempt(attempt)
                                .with_reason("broadcast accepted, awaiting confirmation")
                                .with_tx_hash(tx_hash),
                        );
                    }
                }
            }
            Ok(Err(e)) => {
                applied.extend(
                    self.handle_attempt_failure(order, attempt, now, &e.to_string())
                        .await?,
                );
            }
            Err(_) => {
                applied.extend(
                    self.handle_attempt_failure(order, attempt, now, "attempt timed out")
                        .await?,
                );
            }
        }
        Ok(applied)
    }

    async fn handle_attempt_failure(
        &self,
        order: &CloseOrder,
        attempt: u32,
        now: TimeMs,
        reason: &str,
    ) -> Result<Vec<AppliedTransition>, AppError> {
        let mut applied = Vec::new();
        match plan_after_failure(attempt, self.retry_ceiling, now, self.retry_backoff_ms) {
            FailurePlan::Retry {
                attempts,
                next_attempt_at,
            } => {
                if self
                    .repo
                    .record_retry(&order.position_id, order.kind, attempts, reason, next_attempt_at)
                    .await?
                {
                    applied.push(
                        AppliedTransition::new(order, "executing", "retrying")
                            .with_attempt(attempts)
                            .with_reason(reason),
                    );
                }
            }
            FailurePlan::GiveUp { attempts } => {
                let final_reason = format!("retry ceiling reached: {}", reason);
                if self
                    .repo
                    .mark_order_failed(&order.position_id, order.kind, attempts, &final_reason)
                    .await?
                {
                    applied.push(
                        AppliedTransition::new(order, "executing", "failed")
                            .with_attempt(attempts)
                            .with_reason(final_reason),
                    );
                }
            }
        }
        Ok(applied)
    }
}
