pub mod health;
pub mod orders;
pub mod positions;

use crate::db::Repository;
use crate::orchestration::{LedgerRebuilder, RefreshCoordinator};
use crate::orders::OrderMonitor;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub refresh: Arc<RefreshCoordinator>,
    pub rebuilder: Arc<LedgerRebuilder>,
    pub monitor: Arc<OrderMonitor>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/positions", post(positions::track_position))
        .route("/v1/positions/:id", get(positions::get_position))
        .route("/v1/positions/:id/refresh", post(positions::refresh_position))
        .route("/v1/positions/:id/rebuild", post(positions::rebuild_ledger))
        .route("/v1/positions/:id/events", get(positions::get_ledger_events))
        .route("/v1/positions/refresh-all", post(positions::refresh_all))
        .route("/v1/orders", post(orders::register_order))
        .route(
            "/v1/orders/:position_id/:kind",
            delete(orders::cancel_order),
        )
        .route("/v1/orders/evaluate", post(orders::evaluate_orders))
        .layer(cors)
        .with_state(state)
}
