//! Test server harness for E2E testing
//!
//! Provides `TestProxyServer` for spawning real proxy instances in tests,
//! pointed at a mocked gateway and driven by a `MockClock`.

use gateway_auth::testing::{escape_newlines, MockClock, TEST_RSA_PRIVATE_KEY_PEM};
use gateway_auth::SessionCache;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use noon_proxy::config::Config;
use noon_proxy::routes::{self, AppState};
use noon_proxy::services::Forwarder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Key identifier used by every test server.
pub const TEST_KEY_ID: &str = "test-key-id";

/// Project code used by every test server.
pub const TEST_PROJECT_CODE: &str = "PRJ-TEST";

/// Shared metrics handle. The recorder is built but not installed globally,
/// so parallel test servers do not conflict.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| PrometheusBuilder::new().build_recorder().handle())
        .clone()
}

/// Test harness for spawning the proxy in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let gateway = wiremock::MockServer::start().await;
/// mount_login_success(&gateway).await;
///
/// let server = TestProxyServer::spawn(&gateway.uri()).await?;
/// let response = reqwest::get(format!("{}/whoami", server.url())).await?;
/// ```
pub struct TestProxyServer {
    addr: SocketAddr,
    config: Config,
    sessions: Arc<SessionCache>,
    clock: MockClock,
    _handle: JoinHandle<()>,
}

impl TestProxyServer {
    /// Spawn a proxy for the gateway at `gateway_url` with default settings.
    pub async fn spawn(gateway_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(gateway_url, &[]).await
    }

    /// Spawn a proxy with extra environment-style variables
    /// (e.g. `("REACTIVE_INVALIDATION", "true")`).
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Sign logins with the fixture RSA key
    /// - Take time from a `MockClock`, exposed via [`Self::clock`]
    pub async fn spawn_with_vars(
        gateway_url: &str,
        extra_vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("NOON_KEY_ID".to_string(), TEST_KEY_ID.to_string()),
            (
                "NOON_PRIVATE_KEY".to_string(),
                escape_newlines(TEST_RSA_PRIVATE_KEY_PEM),
            ),
            ("NOON_PROJECT_CODE".to_string(), TEST_PROJECT_CODE.to_string()),
            ("NOON_GATEWAY_URL".to_string(), gateway_url.to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (name, value) in extra_vars {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let clock = MockClock::new();
        let sessions = Arc::new(SessionCache::with_clock(
            config.credentials(),
            config.gateway_settings(),
            Arc::new(clock.clone()),
        ));
        let forwarder = Arc::new(Forwarder::new(
            Arc::clone(&sessions),
            config.reactive_invalidation,
        ));
        let state = Arc::new(AppState {
            config: config.clone(),
            forwarder,
        });

        // Build routes using the proxy's real route builder
        let app = routes::build_routes(state, metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            sessions,
            clock,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's session cache, for state assertions.
    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// The clock driving session expiry.
    pub fn clock(&self) -> &MockClock {
        &self.clock
    }
}

impl Drop for TestProxyServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let gateway = wiremock::MockServer::start().await;
        let server = TestProxyServer::spawn(&gateway.uri()).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/ping", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "ok");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_provides_addr() -> Result<(), anyhow::Error> {
        let gateway = wiremock::MockServer::start().await;
        let server = TestProxyServer::spawn(&gateway.uri()).await?;

        let addr = server.addr();
        assert!(addr.ip().is_loopback());
        assert!(addr.port() > 0);
        assert_eq!(server.url(), format!("http://{}", addr));

        Ok(())
    }

    #[tokio::test]
    async fn test_extra_vars_override_defaults() -> Result<(), anyhow::Error> {
        let gateway = wiremock::MockServer::start().await;
        let server =
            TestProxyServer::spawn_with_vars(&gateway.uri(), &[("REACTIVE_INVALIDATION", "true")])
                .await?;

        assert!(server.config().reactive_invalidation);
        assert_eq!(server.config().key_id, TEST_KEY_ID);

        Ok(())
    }
}
