use crate::api::AppState;
use crate::domain::{
    Address, Decimal, LedgerEvent, PositionConfig, PositionId, PositionState,
};
use crate::engine::{AprSummary, PositionStatus};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPositionRequest {
    pub config: PositionConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub config: PositionConfig,
    pub state: PositionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PositionStatus>,
}

/// Start tracking a freshly-opened position.
pub async fn track_position(
    State(state): State<AppState>,
    Json(request): Json<TrackPositionRequest>,
) -> Result<Json<PositionResponse>, AppError> {
    let config = request.config;
    if config.tick_lower >= config.tick_upper {
        return Err(AppError::Validation(
            "tickLower must be strictly below tickUpper".to_string(),
        ));
    }
    if config.token1.is_token0_of(&config.token0) {
        return Err(AppError::Validation(
            "token0/token1 must follow address ordering".to_string(),
        ));
    }

    let position_state = PositionState::empty();
    state.repo.insert_position(&config, &position_state).await?;
    Ok(Json(PositionResponse {
        config,
        state: position_state,
        status: None,
    }))
}

fn parse_position_id(id: &str) -> Result<PositionId, AppError> {
    PositionId::from_str(id)
        .map_err(|_| AppError::Validation(format!("invalid position id: {}", id)))
}

pub async fn get_position(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PositionResponse>, AppError> {
    let position_id = parse_position_id(&id)?;
    let Some((config, position_state)) = state.repo.get_position(&position_id).await? else {
        return Err(AppError::NotFound(format!("position {}", position_id)));
    };
    Ok(Json(PositionResponse {
        config,
        state: position_state,
        status: None,
    }))
}

/// Refresh one position from chain and return the derived metrics.
pub async fn refresh_position(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PositionResponse>, AppError> {
    let position_id = parse_position_id(&id)?;
    let result = state.refresh.refresh(&position_id).await?;
    let Some((config, _)) = state.repo.get_position(&position_id).await? else {
        return Err(AppError::NotFound(format!("position {}", position_id)));
    };
    Ok(Json(PositionResponse {
        config,
        state: result.state,
        status: Some(result.status),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResponse {
    pub events: Vec<LedgerEvent>,
    pub apr: AprSummary,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub collected_fees: Decimal,
}

/// Rebuild the position's ledger from upstream events.
pub async fn rebuild_ledger(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RebuildResponse>, AppError> {
    let position_id = parse_position_id(&id)?;
    let result = state.rebuilder.rebuild(&position_id).await?;
    Ok(Json(RebuildResponse {
        events: result.events,
        apr: result.summary,
        cost_basis: result.state.cost_basis,
        realized_pnl: result.state.realized_pnl,
        collected_fees: result.state.collected_fees,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEventsResponse {
    pub events: Vec<LedgerEvent>,
}

/// Stored ledger listing, newest first.
pub async fn get_ledger_events(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LedgerEventsResponse>, AppError> {
    let position_id = parse_position_id(&id)?;
    if state.repo.get_position(&position_id).await?.is_none() {
        return Err(AppError::NotFound(format!("position {}", position_id)));
    }
    let events = state.repo.query_ledger_events(&position_id).await?;
    Ok(Json(LedgerEventsResponse { events }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAllRequest {
    pub owner: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAllEntry {
    pub position_id: PositionId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PositionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshAllResponse {
    pub results: Vec<RefreshAllEntry>,
}

/// Bulk refresh for an owner, throttled by the cooldown window.
pub async fn refresh_all(
    State(state): State<AppState>,
    Json(request): Json<RefreshAllRequest>,
) -> Result<Json<RefreshAllResponse>, AppError> {
    let owner = Address::new(request.owner);
    let results = state.refresh.refresh_all(&owner).await?;

    let entries = results
        .into_iter()
        .map(|(position_id, outcome)| match outcome {
            Ok(result) => RefreshAllEntry {
                position_id,
                ok: true,
                status: Some(result.status),
                error: None,
            },
            Err(e) => RefreshAllEntry {
                position_id,
                ok: false,
                status: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Ok(Json(RefreshAllResponse { results: entries }))
}
