//! Gateway mocks for E2E tests.
//!
//! Thin helpers over `wiremock` for the login exchange and request counting.

use gateway_auth::session::LOGIN_PATH;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Session cookie set by a successful mocked login.
pub const SESSION_COOKIE: &str = "gw_session=test-session";

/// Mount a login endpoint that always succeeds and sets a session cookie.
pub async fn mount_login_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("{SESSION_COOKIE}; Path=/").as_str())
                .set_body_json(serde_json::json!({"status": "ok"})),
        )
        .mount(server)
        .await;
}

/// Mount a login endpoint that always fails with `status` and `body`.
pub async fn mount_login_failure(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Number of requests the gateway received on `request_path`.
pub async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

/// Number of login exchanges the gateway received.
pub async fn login_count(server: &MockServer) -> usize {
    requests_to(server, LOGIN_PATH).await
}

/// Total number of requests the gateway received.
pub async fn total_requests(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}
