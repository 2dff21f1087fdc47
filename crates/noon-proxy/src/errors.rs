//! Proxy error types.
//!
//! Local failures map to HTTP status codes via the `IntoResponse` impl.
//! Upstream business responses are never errors here: they are relayed
//! verbatim by the forwarding handler. Messages for 5xx errors are generic;
//! details are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway_auth::SessionError;
use serde::Serialize;
use thiserror::Error;

/// Proxy error type.
///
/// Maps to HTTP status codes:
/// - Signing, Internal: 500 Internal Server Error
/// - LoginRejected: the gateway's status if it is 4xx/5xx, else 502
/// - Upstream: 502 Bad Gateway
/// - BadRequest: 400 Bad Request
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Login failed with status {status}: {body}")]
    LoginRejected { status: u16, body: String },

    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal,
}

impl ProxyError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Signing(_) | ProxyError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::LoginRejected { status, .. } => login_status(*status),
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Status surfaced for a rejected login.
fn login_status(upstream: u16) -> StatusCode {
    match StatusCode::from_u16(upstream) {
        Ok(status) if status.is_client_error() || status.is_server_error() => status,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<SessionError> for ProxyError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Signing(e) => ProxyError::Signing(e.to_string()),
            SessionError::LoginRejected { status, body } => {
                ProxyError::LoginRejected { status, body }
            }
            SessionError::HttpError(e) => ProxyError::Upstream(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            ProxyError::Signing(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "proxy.errors", error = %err, "Login token signing failed");
                (
                    "SIGNING_ERROR",
                    "Failed to create gateway credentials".to_string(),
                )
            }
            ProxyError::LoginRejected { status, body } => {
                tracing::warn!(target: "proxy.errors", upstream_status = status, "Gateway login rejected");
                ("LOGIN_FAILED", format!("Login failed: {body}"))
            }
            ProxyError::Upstream(reason) => {
                tracing::warn!(target: "proxy.errors", reason = %reason, "Gateway unavailable");
                (
                    "UPSTREAM_UNAVAILABLE",
                    "Gateway is unavailable".to_string(),
                )
            }
            ProxyError::BadRequest(reason) => ("BAD_REQUEST", reason.clone()),
            ProxyError::Internal => ("INTERNAL_ERROR", "An internal error occurred".to_string()),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
