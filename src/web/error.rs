use crate::domain::error::EngineError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// HTTP-facing wrapper around the engine taxonomy. Keeps handlers on `?`
/// and produces consistent JSON error bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Engine(EngineError::Store(err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Engine(err) = self;
        let (status, body) = match err {
            EngineError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "validation_failed", "details": errors }),
            ),
            EngineError::AttemptBudgetExhausted => (
                StatusCode::CONFLICT,
                json!({ "error": "attempt_budget_exhausted" }),
            ),
            EngineError::Overdue => (StatusCode::FORBIDDEN, json!({ "error": "overdue" })),
            EngineError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "entity": entity, "id": id }),
            ),
            EngineError::Store(StoreError::Conflict) => {
                (StatusCode::CONFLICT, json!({ "error": "conflict" }))
            }
            EngineError::Store(StoreError::Backend(err)) => {
                tracing::error!("store backend error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
