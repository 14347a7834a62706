//! Uniform HTTP error envelope (§6.1): every `CoreError` that escapes a
//! handler is folded through here rather than through axum's default
//! rejection bodies.

use agentcore_core::{CoreError, ErrorKind};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    details: Option<serde_json::Value>,
    error_id: String,
}

/// Wraps a `CoreError` so it can be returned directly from a handler's
/// `Result` without a manual `match` at every call site.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetail {
                code: err.kind.to_string(),
                message: err.message,
                details: err.details,
                error_id: err.error_id,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Builds a response directly from an `ErrorKind`, for call sites (auth,
/// body extraction) that never held a constructed `CoreError`.
pub fn plain_error(kind: ErrorKind, message: impl Into<String>) -> Response {
    ApiError(CoreError::new(kind, message)).into_response()
}
