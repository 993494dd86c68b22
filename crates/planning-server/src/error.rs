//! The `{success, data|error, meta?}` JSON envelope (§6.2) and the conversion
//! from [`PlanningError`] into an HTTP response, with status codes mirroring
//! the error taxonomy (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use planning_core::PlanningError;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// The `error` half of the envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl From<&PlanningError> for ApiError {
    fn from(err: &PlanningError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.message().to_string(),
            suggestion: err.suggestion().map(str::to_string),
            retry_after_seconds: err.retry_after_seconds(),
        }
    }
}

/// The response envelope every handler returns (§6.2).
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<JsonValue>,
}

impl<T> Envelope<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, meta: None }
    }

    #[must_use]
    pub fn ok_with_meta(data: T, meta: JsonValue) -> Self {
        Self { success: true, data: Some(data), error: None, meta: Some(meta) }
    }
}

/// Wraps a [`PlanningError`] so handlers can propagate it with `?` and have
/// axum turn it into the envelope's error shape with the right status code.
pub struct AppError(pub PlanningError);

impl From<PlanningError> for AppError {
    fn from(err: PlanningError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Envelope<()> = Envelope { success: false, data: None, error: Some(ApiError::from(&self.0)), meta: None };
        (status, Json(body)).into_response()
    }
}

/// Shorthand for the `Result<Json<Envelope<T>>, AppError>` every handler returns.
pub type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError(PlanningError::not_found("application APP-1 not found"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn budget_exceeded_maps_to_503() {
        let err = AppError(PlanningError::budget_exceeded("daily budget spent"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
