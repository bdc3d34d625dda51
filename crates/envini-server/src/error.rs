//! HTTP error types for the `Envini` server.
//!
//! Maps [`VaultError`] into HTTP responses. Every response carries a JSON
//! body with a machine-readable `error` field (the vault error kind) and a
//! human-readable `message`. Server-side failures never echo their detail
//! to the caller; it is logged instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use envini_core::VaultError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing or malformed bearer token.
    Unauthorized(String),
    /// A vault operation failed.
    Vault(VaultError),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::Vault(err) => {
                let kind = err.kind();
                match err {
                    VaultError::AccessDenied { .. } => {
                        (StatusCode::FORBIDDEN, kind, err.to_string())
                    }
                    VaultError::UpstreamUnavailable { .. } => {
                        (StatusCode::BAD_GATEWAY, kind, err.to_string())
                    }
                    VaultError::NotFound { .. } => (StatusCode::NOT_FOUND, kind, err.to_string()),
                    VaultError::Validation(_) => (StatusCode::BAD_REQUEST, kind, err.to_string()),
                    VaultError::Configuration(_)
                    | VaultError::Crypto(_)
                    | VaultError::Persistence(_) => {
                        error!(error = %err, kind, "request failed");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            kind,
                            "internal server error".to_owned(),
                        )
                    }
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();
        let body = ErrorBody {
            error: error_type,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        Self::Vault(err)
    }
}
