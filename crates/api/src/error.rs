//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CommerceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No usable identity on the request.
    Unauthorized(String),
    /// Malformed body, path or query.
    BadRequest(String),
    /// Error raised by a storefront service.
    Commerce(CommerceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Commerce(err) => commerce_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn commerce_error_to_response(err: CommerceError) -> (StatusCode, String) {
    match &err {
        CommerceError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CommerceError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        CommerceError::InsufficientStock { .. } | CommerceError::Validation(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CommerceError::CartClosed(_) | CommerceError::Conflict(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        CommerceError::Internal(detail) => {
            tracing::error!(error = %detail, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        ApiError::Commerce(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
