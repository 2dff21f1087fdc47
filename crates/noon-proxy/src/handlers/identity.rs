//! Gateway connectivity check.
//!
//! `/login` proves the configured credentials work end to end: it obtains a
//! session (logging in if needed) and asks the gateway who we are.

use crate::endpoints;
use crate::errors::ProxyError;
use crate::models::LoginCheckResponse;
use crate::routes::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity check handler.
///
/// On a 2xx whoami the identity is wrapped as
/// `{"status":"success","user":<whoami>}`; any other whoami answer is
/// relayed as-is.
#[tracing::instrument(skip_all, name = "proxy.identity.login_check")]
pub async fn login_check(State(state): State<Arc<AppState>>) -> Result<Response, ProxyError> {
    let whoami = endpoints::find("whoami").ok_or(ProxyError::Internal)?;
    let response = state
        .forwarder
        .forward(whoami, &HashMap::new(), None)
        .await?;

    if !response.is_success() {
        tracing::warn!(
            target: "proxy.handlers.identity",
            gateway_url = %state.config.gateway_url,
            status = response.status.as_u16(),
            "Gateway login check: whoami failed"
        );
        return Ok(response.into_response());
    }

    let user = serde_json::from_slice(&response.body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&response.body).into_owned())
    });

    tracing::info!(
        target: "proxy.handlers.identity",
        gateway_url = %state.config.gateway_url,
        key_id = %state.config.key_id,
        "Gateway login check succeeded"
    );

    Ok(Json(LoginCheckResponse::success(user)).into_response())
}
