//! Response models owned by the proxy.
//!
//! Forwarded responses are relayed as raw bytes and have no model here.

use serde::{Deserialize, Serialize};

/// Liveness response for `/ping` and `/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Response of the `/login` connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginCheckResponse {
    pub status: String,

    /// Identity reported by the gateway's whoami call.
    pub user: serde_json::Value,
}

impl LoginCheckResponse {
    pub fn success(user: serde_json::Value) -> Self {
        Self {
            status: "success".to_string(),
            user,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let json = serde_json::to_value(HealthResponse::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok"}));
    }

    #[test]
    fn test_login_check_response_serialization() {
        let response = LoginCheckResponse::success(serde_json::json!({"email": "ops@example.com"}));
        let json = serde_json::to_value(response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"status": "success", "user": {"email": "ops@example.com"}})
        );
    }
}
