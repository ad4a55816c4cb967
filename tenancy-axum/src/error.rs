use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tenancy_core::errors::{ErrorKind, TenancyError};

/// Handler error: any `anyhow::Error`, answered in the tenancy JSON shape.
#[derive(Debug)]
pub struct TenancyAxumError(pub anyhow::Error);

impl From<anyhow::Error> for TenancyAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for TenancyAxumError {
    fn into_response(self) -> Response {
        let err = TenancyError::normalize(self.0);
        if err.kind == ErrorKind::GeneralError {
            tracing::error!(error = %err, "request failed");
        }

        let status = StatusCode::from_u16(err.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(err.sanitize_for_client().to_json())).into_response()
    }
}
