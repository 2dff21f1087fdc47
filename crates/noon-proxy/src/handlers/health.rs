//! Liveness handlers.
//!
//! `/ping` and `/` answer from the process alone; they never touch the
//! session cache or the gateway.

use crate::models::HealthResponse;
use axum::Json;

/// Liveness check handler.
pub async fn ping() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_returns_ok() {
        let Json(body) = ping().await;
        assert_eq!(body.status, "ok");
    }
}
