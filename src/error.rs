//! Application error taxonomy.
//!
//! Math and engine layers raise their own narrow errors; this is where
//! orchestration and the API classify them. Retryable conditions map to
//! 429/503 so clients know to come back; terminal ones are 4xx/500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected before any computation ran.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Transient chain trouble; safe to retry.
    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),
    /// The chain answered with values that cannot be trusted (all-zero
    /// position state, burned NFT). Not retryable without review.
    #[error("Chain data corrupt: {0}")]
    DataCorrupt(String),
    /// Swap target not covered by the signed strategy intent. Terminal;
    /// nothing was signed.
    #[error("Compliance violation: {0}")]
    ComplianceViolation(String),
    /// Signer or broadcast failure. Retryable up to the attempt ceiling.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    /// Cooldown not elapsed; retry after the given seconds.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },
    /// The upstream event source rate-limited a rebuild mid-fetch.
    #[error("Upstream rate limited")]
    UpstreamRateLimited,
    /// A duplicate ACTIVE close order exists for this slot.
    #[error("Duplicate active order for this position and kind")]
    DuplicateActiveSlot,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::engine::StatusError> for AppError {
    fn from(err: crate::engine::StatusError) -> Self {
        AppError::DataCorrupt(err.to_string())
    }
}

impl From<crate::engine::ReplayError> for AppError {
    fn from(err: crate::engine::ReplayError) -> Self {
        AppError::DataCorrupt(err.to_string())
    }
}

impl From<crate::chain::ChainSourceError> for AppError {
    fn from(err: crate::chain::ChainSourceError) -> Self {
        use crate::chain::ChainSourceError::*;
        match err {
            RateLimited => AppError::UpstreamRateLimited,
            Inconsistent(msg) => AppError::DataCorrupt(msg),
            other if other.is_transient() => AppError::ChainUnavailable(other.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, retry_after) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::ChainUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone(), None)
            }
            AppError::DataCorrupt(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::ComplianceViolation(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::ExecutionFailed(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), None),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                self.to_string(),
                Some(*retry_after_secs),
            ),
            AppError::UpstreamRateLimited => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), None)
            }
            AppError::DuplicateActiveSlot => (StatusCode::CONFLICT, self.to_string(), None),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), None),
        };

        let body = Json(json!({
            "error": error_message,
            "retryAfter": retry_after,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainSourceError;

    #[test]
    fn test_chain_error_classification() {
        let app: AppError = ChainSourceError::Network("refused".into()).into();
        assert!(matches!(app, AppError::ChainUnavailable(_)));

        let app: AppError = ChainSourceError::RateLimited.into();
        assert!(matches!(app, AppError::UpstreamRateLimited));

        let app: AppError = ChainSourceError::Inconsistent("zeroed".into()).into();
        assert!(matches!(app, AppError::DataCorrupt(_)));

        let app: AppError = ChainSourceError::Parse("bad json".into()).into();
        assert!(matches!(app, AppError::Internal(_)));
    }
}
