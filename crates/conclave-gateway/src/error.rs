//! Maps `conclave_core::Error` onto the HTTP surface (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conclave_core::Error;
use serde_json::json;

/// Newtype so handlers can `?` a `conclave_core::Result` straight into an
/// axum response without an orphan-rule `impl IntoResponse for Error`.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "kind": self.0.kind(),
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
