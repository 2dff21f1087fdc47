//! Forwarding of business operations to the gateway.
//!
//! Each call performs one session-cache lookup (logging in if needed) and
//! exactly one upstream request. The upstream status and body are returned
//! unchanged; only failures to reach the gateway become [`ProxyError`]s.

use crate::endpoints::Endpoint;
use crate::errors::ProxyError;
use crate::observability::metrics::{
    record_session_invalidation, record_upstream_call, UpstreamOutcome,
};
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use gateway_auth::{Session, SessionCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Content type assumed when the gateway omits one.
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Gateway response relayed to the caller.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Gateway status code.
    pub status: StatusCode,

    /// Gateway `Content-Type`, if any.
    pub content_type: Option<HeaderValue>,

    /// Gateway body, byte for byte.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Whether the gateway answered 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let content_type = self
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        (self.status, [(CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// Forwards operations through the shared session cache.
#[derive(Debug)]
pub struct Forwarder {
    sessions: Arc<SessionCache>,
    reactive_invalidation: bool,
}

impl Forwarder {
    /// Create a forwarder over `sessions`.
    ///
    /// With `reactive_invalidation`, a 401/403 from the gateway clears the
    /// session that produced it.
    pub fn new(sessions: Arc<SessionCache>, reactive_invalidation: bool) -> Self {
        Self {
            sessions,
            reactive_invalidation,
        }
    }

    /// The session cache backing this forwarder.
    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// Forward one operation.
    ///
    /// Path parameters are validated before the session cache is consulted,
    /// so malformed requests never trigger a login.
    ///
    /// # Errors
    ///
    /// - `ProxyError::BadRequest` if a path parameter is missing or unsafe
    /// - `ProxyError::Signing`, `ProxyError::LoginRejected`,
    ///   `ProxyError::Upstream` if no session could be obtained
    /// - `ProxyError::Upstream` if the forwarded call does not complete
    #[instrument(skip_all, name = "proxy.forward", fields(operation = endpoint.name))]
    pub async fn forward(
        &self,
        endpoint: &Endpoint,
        params: &HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Result<UpstreamResponse, ProxyError> {
        let path = endpoint.upstream_path(params)?;
        let start = Instant::now();

        let session = match self.sessions.get_session().await {
            Ok(session) => session,
            Err(e) => {
                record_upstream_call(endpoint.name, UpstreamOutcome::NoSession, start.elapsed());
                return Err(e.into());
            }
        };

        let result = self.send(&session, endpoint, &path, body).await;

        match &result {
            Ok(response) => {
                let outcome = UpstreamOutcome::from_status(response.status.as_u16());
                record_upstream_call(endpoint.name, outcome, start.elapsed());

                if outcome == UpstreamOutcome::Unauthorized {
                    self.on_unauthorized(&session, endpoint, response.status).await;
                }
            }
            Err(_) => {
                record_upstream_call(
                    endpoint.name,
                    UpstreamOutcome::TransportError,
                    start.elapsed(),
                );
            }
        }

        result
    }

    async fn send(
        &self,
        session: &Session,
        endpoint: &Endpoint,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<UpstreamResponse, ProxyError> {
        let mut request = session
            .client()
            .request(endpoint.method.as_method(), session.url(path));

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(
                target: "proxy.services.forwarder",
                operation = endpoint.name,
                error = %e,
                "Gateway request failed"
            );
            ProxyError::Upstream(e.to_string())
        })?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(|e| {
            warn!(
                target: "proxy.services.forwarder",
                operation = endpoint.name,
                error = %e,
                "Failed to read gateway response body"
            );
            ProxyError::Upstream(e.to_string())
        })?;

        debug!(
            target: "proxy.services.forwarder",
            operation = endpoint.name,
            session_id = %session.id(),
            status = status.as_u16(),
            "Gateway responded"
        );

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    async fn on_unauthorized(&self, session: &Arc<Session>, endpoint: &Endpoint, status: StatusCode) {
        if !self.reactive_invalidation {
            debug!(
                target: "proxy.services.forwarder",
                operation = endpoint.name,
                status = status.as_u16(),
                "Gateway rejected session, keeping it until TTL"
            );
            return;
        }

        if self.sessions.invalidate(session).await {
            warn!(
                target: "proxy.services.forwarder",
                operation = endpoint.name,
                session_id = %session.id(),
                status = status.as_u16(),
                "Gateway rejected session, cleared cached session"
            );
            record_session_invalidation(endpoint.name);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::endpoints;
    use gateway_auth::testing::{MockClock, TEST_RSA_PRIVATE_KEY_PEM};
    use gateway_auth::{CacheState, Credentials, GatewaySettings};
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN: &str = "/identity/public/v1/api/login";

    fn forwarder(server: &MockServer, reactive: bool) -> Forwarder {
        let credentials = Credentials::new(
            "key-1".to_string(),
            SecretString::from(TEST_RSA_PRIVATE_KEY_PEM),
            "PRJ1".to_string(),
        );
        let cache = SessionCache::with_clock(
            credentials,
            GatewaySettings::new(server.uri()),
            Arc::new(MockClock::new()),
        );
        Forwarder::new(Arc::new(cache), reactive)
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(LOGIN))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(server)
            .await;
    }

    fn no_params() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_forward_post_relays_status_and_body() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("POST"))
            .and(path("/stock/v1/stock-update"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({"sku": "ABC", "qty": 5})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let forwarder = forwarder(&server, false);
        let endpoint = endpoints::find("stock_update").unwrap();
        let body = Bytes::from_static(br#"{"sku":"ABC","qty":5}"#);

        let response = forwarder
            .forward(endpoint, &no_params(), Some(body))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(json, serde_json::json!({"result": "ok"}));
    }

    #[tokio::test]
    async fn test_forward_relays_error_status_verbatim() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/fbpo/v1/po/PO9/get"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_raw("no such po", "text/plain"),
            )
            .mount(&server)
            .await;

        let forwarder = forwarder(&server, false);
        let endpoint = endpoints::find("po_get").unwrap();
        let params = HashMap::from([("id".to_string(), "PO9".to_string())]);

        let response = forwarder.forward(endpoint, &params, None).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body, Bytes::from_static(b"no such po"));
        assert_eq!(
            response.content_type.unwrap().to_str().unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn test_invalid_param_skips_login() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let forwarder = forwarder(&server, false);
        let endpoint = endpoints::find("order_get").unwrap();
        let params = HashMap::from([("id".to_string(), "..".to_string())]);

        let result = forwarder.forward(endpoint, &params, None).await;

        assert!(matches!(result, Err(ProxyError::BadRequest(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_and_skips_forward() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LOGIN))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let forwarder = forwarder(&server, false);
        let endpoint = endpoints::find("whoami").unwrap();

        let result = forwarder.forward(endpoint, &no_params(), None).await;

        assert!(matches!(
            result,
            Err(ProxyError::LoginRejected { status: 401, ref body }) if body == "bad key"
        ));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_session_by_default() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/identity/v1/whoami"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let forwarder = forwarder(&server, false);
        let endpoint = endpoints::find("whoami").unwrap();

        let response = forwarder.forward(endpoint, &no_params(), None).await.unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(forwarder.sessions().state().await, CacheState::Valid);
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session_when_reactive() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/identity/v1/whoami"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let forwarder = forwarder(&server, true);
        let endpoint = endpoints::find("whoami").unwrap();

        let response = forwarder.forward(endpoint, &no_params(), None).await.unwrap();

        // Still relayed verbatim
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(forwarder.sessions().state().await, CacheState::Empty);
        assert!(forwarder.sessions().current().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_maps_to_upstream() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        Mock::given(method("GET"))
            .and(path("/identity/v1/whoami"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let credentials = Credentials::new(
            "key-1".to_string(),
            SecretString::from(TEST_RSA_PRIVATE_KEY_PEM),
            "PRJ1".to_string(),
        );
        let settings = GatewaySettings::new(server.uri())
            .with_http_timeout(std::time::Duration::from_millis(200));
        let cache = SessionCache::with_clock(credentials, settings, Arc::new(MockClock::new()));
        let forwarder = Forwarder::new(Arc::new(cache), false);
        let endpoint = endpoints::find("whoami").unwrap();

        let result = forwarder.forward(endpoint, &no_params(), None).await;

        assert!(matches!(result, Err(ProxyError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_missing_content_type_defaults_to_json() {
        let response = UpstreamResponse {
            status: StatusCode::CREATED,
            content_type: None,
            body: Bytes::from_static(b"{}"),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
