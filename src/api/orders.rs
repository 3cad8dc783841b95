use crate::api::AppState;
use crate::domain::{CloseOrder, OrderKind, PositionId, SwapIntent, TriggerMode};
use crate::error::AppError;
use crate::orders::{self, AppliedTransition};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterOrderRequest {
    pub position_id: String,
    pub kind: OrderKind,
    pub trigger_tick: i32,
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub swap_intent: Option<SwapIntent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order: CloseOrder,
}

/// Register a stop-loss or take-profit close order.
pub async fn register_order(
    State(state): State<AppState>,
    Json(request): Json<RegisterOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let position_id = PositionId::from_str(&request.position_id)
        .map_err(|_| AppError::Validation(format!("invalid position id: {}", request.position_id)))?;

    let order = orders::register_order(
        &state.repo,
        position_id,
        request.kind,
        request.trigger_tick,
        request.trigger_mode,
        request.swap_intent,
    )
    .await?;
    Ok(Json(OrderResponse { order }))
}

/// Cancel a live order. Wins races against in-flight execution by the
/// pre-broadcast status check; an already-broadcast tx is only observed.
pub async fn cancel_order(
    Path((position_id, kind)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let position_id = PositionId::from_str(&position_id)
        .map_err(|_| AppError::Validation(format!("invalid position id: {}", position_id)))?;
    let kind: OrderKind = kind
        .parse()
        .map_err(|e: String| AppError::Validation(e))?;

    let cancelled = state.monitor.cancel_order(&position_id, kind).await?;
    if !cancelled {
        return Err(AppError::NotFound(format!(
            "no cancellable {} order for position {}",
            kind.as_str(),
            position_id
        )));
    }
    Ok(Json(serde_json::json!({"cancelled": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOrdersRequest {
    pub tick: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOrdersResponse {
    pub transitions: Vec<AppliedTransition>,
}

/// Evaluate all open orders against a supplied tick; returns every applied
/// transition for observability.
pub async fn evaluate_orders(
    State(state): State<AppState>,
    Json(request): Json<EvaluateOrdersRequest>,
) -> Result<Json<EvaluateOrdersResponse>, AppError> {
    let transitions = state.monitor.evaluate_at_tick(request.tick).await?;
    Ok(Json(EvaluateOrdersResponse { transitions }))
}
