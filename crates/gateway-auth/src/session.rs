//! Authenticated gateway session cache.
//!
//! Holds at most one logged-in gateway client and hands it out until it is
//! [`SESSION_TTL`] old. When the slot is empty or stale, the next caller mints
//! a login token, performs the login exchange, and stores the new session.
//!
//! # States
//!
//! ```text
//!            login 200
//!   EMPTY ---------------> VALID
//!     ^                      |
//!     +---- now - created_at >= TTL
//! ```
//!
//! - Fresh session: returned as-is, no network call
//! - Login failure: error returned, slot left untouched (no retry)
//! - Concurrent callers on an empty slot: serialized behind an async mutex,
//!   so exactly one login is performed and waiters reuse its result, whether
//!   it succeeded or failed. A caller arriving after a failed attempt has
//!   completed starts a new one.
//!
//! # Security
//!
//! - The login token is only exposed to the request body
//! - Login rejection bodies are logged at trace level only
//! - Login and downstream calls use explicit request and connect timeouts

use crate::clock::{Clock, SystemClock};
use crate::credentials::Credentials;
use crate::minter::{SigningError, TokenMinter};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Lifetime of a cached session (50 minutes).
pub const SESSION_TTL: Duration = Duration::from_secs(3000);

/// Login endpoint path on the gateway.
pub const LOGIN_PATH: &str = "/identity/public/v1/api/login";

/// Default gateway base URL.
pub const DEFAULT_GATEWAY_URL: &str = "https://noon-api-gateway.noon.partners";

/// Default `User-Agent` sent on login and every session call.
pub const DEFAULT_USER_AGENT: &str = "Zoho-Noon-Integration/1.0";

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while obtaining a session.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// The login token could not be minted.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The gateway answered the login with a non-200 status.
    #[error("Login failed with status {status}: {body}")]
    LoginRejected {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream response body.
        body: String,
    },

    /// The login request did not complete (connect, timeout, TLS).
    #[error("HTTP client error: {0}")]
    HttpError(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Transport settings for the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Gateway base URL, without trailing slash.
    pub base_url: String,

    /// `User-Agent` header value.
    pub user_agent: String,

    /// HTTP request timeout for login and session calls.
    pub http_timeout: Duration,
}

impl GatewaySettings {
    /// Create settings for `base_url` with default user agent and timeout.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::new(DEFAULT_GATEWAY_URL.to_string())
    }
}

// =============================================================================
// Session
// =============================================================================

/// A logged-in gateway client.
///
/// Carries the cookie jar and default headers established by the login
/// exchange. Sessions are immutable; a refresh replaces the whole value.
pub struct Session {
    id: Uuid,
    client: reqwest::Client,
    base_url: String,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Session identifier, for log correlation only.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Authenticated HTTP client.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Absolute URL for a gateway `path` (must start with `/`).
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// When the login that produced this session succeeded.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this session is still fresh at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        is_valid(now, self.created_at)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Whether a session created at `created_at` is still fresh at `now`.
///
/// Fresh iff `now - created_at < SESSION_TTL`.
#[must_use]
pub fn is_valid(now: DateTime<Utc>, created_at: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(created_at);
    match chrono::Duration::from_std(SESSION_TTL) {
        Ok(ttl) => age < ttl,
        Err(_) => false,
    }
}

/// Observable state of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No session, or the stored one has expired.
    Empty,
    /// A fresh session is stored.
    Valid,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    token: &'a str,
    default_project_code: &'a str,
}

// =============================================================================
// Session Cache
// =============================================================================

/// Guarded state of the cache.
#[derive(Default)]
struct Slot {
    session: Option<Arc<Session>>,

    /// Outcome of the most recent attempt, if it failed.
    last_failure: Option<SessionError>,
}

/// Process-wide holder of the gateway session.
pub struct SessionCache {
    minter: TokenMinter,
    credentials: Arc<Credentials>,
    settings: GatewaySettings,
    clock: Arc<dyn Clock>,
    slot: Mutex<Slot>,

    /// Completed login attempts. Only advanced while `slot` is held.
    attempts: AtomicU64,
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("credentials", &self.credentials)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    /// Create an empty cache using the system clock.
    #[must_use]
    pub fn new(credentials: Credentials, settings: GatewaySettings) -> Self {
        Self::with_clock(credentials, settings, Arc::new(SystemClock))
    }

    /// Create an empty cache taking time from `clock`.
    #[must_use]
    pub fn with_clock(
        credentials: Credentials,
        settings: GatewaySettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let credentials = Arc::new(credentials);
        Self {
            minter: TokenMinter::new(Arc::clone(&credentials), Arc::clone(&clock)),
            credentials,
            settings,
            clock,
            slot: Mutex::new(Slot::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Gateway transport settings.
    #[must_use]
    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Return a fresh session, logging in if the slot is empty or stale.
    ///
    /// # Errors
    ///
    /// - `SessionError::Signing` if the login token cannot be minted
    /// - `SessionError::LoginRejected` if the gateway answers non-200
    /// - `SessionError::HttpError` if the login request does not complete
    ///
    /// On error the cached session is unchanged. Callers that were already
    /// waiting when an attempt failed receive that attempt's error instead
    /// of starting another login.
    #[instrument(skip_all, name = "gateway_auth.get_session")]
    pub async fn get_session(&self) -> Result<Arc<Session>, SessionError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(session) = slot.session.as_ref() {
            if session.is_valid_at(self.clock.now()) {
                trace!(
                    target: "gateway_auth.session",
                    session_id = %session.id(),
                    "Reusing cached session"
                );
                return Ok(Arc::clone(session));
            }

            debug!(
                target: "gateway_auth.session",
                session_id = %session.id(),
                created_at = %session.created_at(),
                "Cached session expired"
            );
        }

        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(err) = slot.last_failure.clone() {
                debug!(
                    target: "gateway_auth.session",
                    error = %err,
                    "Login attempt failed while waiting, sharing its error"
                );
                return Err(err);
            }
        }

        let result = self.login().await.map(Arc::new);
        match &result {
            Ok(session) => {
                slot.session = Some(Arc::clone(session));
                slot.last_failure = None;
            }
            Err(err) => slot.last_failure = Some(err.clone()),
        }
        self.attempts.fetch_add(1, Ordering::Release);

        result
    }

    /// The stored session, fresh or not.
    pub async fn current(&self) -> Option<Arc<Session>> {
        self.slot.lock().await.session.clone()
    }

    /// Current cache state.
    pub async fn state(&self) -> CacheState {
        let now = self.clock.now();
        match self.slot.lock().await.session.as_ref() {
            Some(session) if session.is_valid_at(now) => CacheState::Valid,
            _ => CacheState::Empty,
        }
    }

    /// Clear the slot if it still holds `session`.
    ///
    /// Returns `true` if the slot was cleared. A slot already replaced by a
    /// newer session is left alone.
    pub async fn invalidate(&self, session: &Arc<Session>) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.session.as_ref() {
            Some(current) if Arc::ptr_eq(current, session) => {
                slot.session = None;
                info!(
                    target: "gateway_auth.session",
                    session_id = %session.id(),
                    "Cached session invalidated"
                );
                true
            }
            _ => false,
        }
    }

    /// Perform one login exchange.
    async fn login(&self) -> Result<Session, SessionError> {
        let start = Instant::now();
        let result = self.login_inner().await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(SessionError::Signing(_)) => "signing_error",
            Err(SessionError::LoginRejected { .. }) => "rejected",
            Err(SessionError::HttpError(_)) => "http_error",
        };
        counter!("gateway_auth_logins_total", "outcome" => outcome).increment(1);
        histogram!("gateway_auth_login_duration_seconds", "outcome" => outcome)
            .record(start.elapsed().as_secs_f64());

        result
    }

    async fn login_inner(&self) -> Result<Session, SessionError> {
        let token = self.minter.mint()?;
        let client = self.build_client()?;
        let url = format!("{}{}", self.settings.base_url, LOGIN_PATH);

        debug!(
            target: "gateway_auth.session",
            url = %url,
            project_code = %self.credentials.project_code(),
            "Logging in to gateway"
        );

        let body = LoginRequest {
            token: token.expose_secret(),
            default_project_code: self.credentials.project_code(),
        };

        let response = client.post(&url).json(&body).send().await.map_err(|e| {
            warn!(target: "gateway_auth.session", error = %e, "Login request failed");
            SessionError::HttpError(e.to_string())
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::OK {
            let session = Session {
                id: Uuid::new_v4(),
                client,
                base_url: self.settings.base_url.clone(),
                created_at: self.clock.now(),
            };

            info!(
                target: "gateway_auth.session",
                session_id = %session.id,
                "Gateway login succeeded"
            );

            Ok(session)
        } else {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "gateway_auth.session", error = %e, "Failed to read login response body");
                String::new()
            });
            warn!(
                target: "gateway_auth.session",
                status = %status,
                "Login rejected by gateway"
            );
            trace!(
                target: "gateway_auth.session",
                body = %body,
                "Login rejection response body"
            );
            Err(SessionError::LoginRejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Build the client a new session will own.
    fn build_client(&self) -> Result<reqwest::Client, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .user_agent(self.settings.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(self.settings.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SessionError::HttpError(format!("Failed to build HTTP client: {e}")))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::minter::LoginClaims;
    use crate::testing::{MockClock, TEST_RSA_PRIVATE_KEY_PEM, TEST_RSA_PUBLIC_KEY_PEM};
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TTL_SECS: i64 = 3000;

    fn test_credentials() -> Credentials {
        Credentials::new(
            "test-key-id".to_string(),
            SecretString::from(TEST_RSA_PRIVATE_KEY_PEM),
            "PRJ-TEST".to_string(),
        )
    }

    fn test_cache(base_url: &str, clock: &MockClock) -> SessionCache {
        SessionCache::with_clock(
            test_credentials(),
            GatewaySettings::new(base_url.to_string()),
            Arc::new(clock.clone()),
        )
    }

    async fn mount_login(server: &MockServer, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn login_count(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == LOGIN_PATH)
            .count()
    }

    // =========================================================================
    // Validity Tests
    // =========================================================================

    #[test]
    fn test_ttl_constant() {
        assert_eq!(SESSION_TTL.as_secs(), 3000);
    }

    #[test]
    fn test_is_valid_boundaries() {
        let created = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(1_000_000);

        assert!(is_valid(created, created));
        assert!(is_valid(
            created + chrono::Duration::seconds(TTL_SECS - 1),
            created
        ));
        assert!(!is_valid(created + chrono::Duration::seconds(TTL_SECS), created));
        assert!(!is_valid(
            created + chrono::Duration::seconds(TTL_SECS + 3600),
            created
        ));
    }

    #[test]
    fn test_gateway_settings_trim_trailing_slash() {
        let settings = GatewaySettings::new("http://gateway.local/".to_string());
        assert_eq!(settings.base_url, "http://gateway.local");
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }

    #[test]
    fn test_gateway_settings_builder() {
        let settings = GatewaySettings::default()
            .with_user_agent("custom/2.0".to_string())
            .with_http_timeout(Duration::from_secs(3));

        assert_eq!(settings.base_url, DEFAULT_GATEWAY_URL);
        assert_eq!(settings.user_agent, "custom/2.0");
        assert_eq!(settings.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_cache_debug_redacts_key() {
        let cache = test_cache("http://localhost:1", &MockClock::new());
        let debug_str = format!("{cache:?}");

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("BEGIN PRIVATE KEY"));
    }

    // =========================================================================
    // Login Tests
    // =========================================================================

    #[tokio::test]
    async fn test_cold_start_performs_one_login() {
        let server = MockServer::start().await;
        mount_login(&server, 200, r#"{"ok":true}"#).await;
        let clock = MockClock::new();
        let cache = test_cache(&server.uri(), &clock);

        assert_eq!(cache.state().await, CacheState::Empty);

        let session = cache.get_session().await.expect("login should succeed");

        assert_eq!(login_count(&server).await, 1);
        assert_eq!(session.created_at(), clock.now());
        assert_eq!(cache.state().await, CacheState::Valid);
    }

    #[tokio::test]
    async fn test_login_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(header("content-type", "application/json"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .and(body_partial_json(serde_json::json!({
                "default_project_code": "PRJ-TEST"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cache = test_cache(&server.uri(), &MockClock::new());
        cache.get_session().await.expect("login should succeed");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let token = body["token"].as_str().expect("token should be a string");

        let key = DecodingKey::from_rsa_pem(TEST_RSA_PUBLIC_KEY_PEM.as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let claims = decode::<LoginClaims>(token, &key, &validation).unwrap().claims;
        assert_eq!(claims.sub, "test-key-id");
    }

    #[tokio::test]
    async fn test_fresh_session_is_reused() {
        let server = MockServer::start().await;
        mount_login(&server, 200, "{}").await;
        let clock = MockClock::new();
        let cache = test_cache(&server.uri(), &clock);

        let first = cache.get_session().await.unwrap();
        clock.advance_secs(TTL_SECS - 1);
        let second = cache.get_session().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(login_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_triggers_one_login() {
        let server = MockServer::start().await;
        mount_login(&server, 200, "{}").await;
        let clock = MockClock::new();
        let cache = test_cache(&server.uri(), &clock);

        let first = cache.get_session().await.unwrap();
        clock.advance_secs(TTL_SECS);
        let second = cache.get_session().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.id(), second.id());
        assert_eq!(second.created_at(), clock.now());
        assert_eq!(login_count(&server).await, 2);

        // The replacement is itself cached
        let third = cache.get_session().await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(login_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_login_failure_from_empty_leaves_slot_empty() {
        let server = MockServer::start().await;
        mount_login(&server, 401, r#"{"error":"bad token"}"#).await;
        let cache = test_cache(&server.uri(), &MockClock::new());

        let result = cache.get_session().await;

        match result {
            Err(SessionError::LoginRejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, r#"{"error":"bad token"}"#);
            }
            other => panic!("expected LoginRejected, got {other:?}"),
        }
        assert!(cache.current().await.is_none());
        assert_eq!(cache.state().await, CacheState::Empty);
    }

    #[tokio::test]
    async fn test_login_failure_keeps_stale_session() {
        let server = MockServer::start().await;
        mount_login(&server, 200, "{}").await;
        let clock = MockClock::new();
        let cache = test_cache(&server.uri(), &clock);

        let original = cache.get_session().await.unwrap();

        server.reset().await;
        mount_login(&server, 503, "maintenance").await;
        clock.advance_secs(TTL_SECS + 10);

        let result = cache.get_session().await;
        assert!(matches!(
            result,
            Err(SessionError::LoginRejected { status: 503, .. })
        ));

        let current = cache.current().await.expect("stale session should remain");
        assert!(Arc::ptr_eq(&original, &current));
        assert_eq!(cache.state().await, CacheState::Empty);
    }

    #[tokio::test]
    async fn test_no_retry_after_failure() {
        let server = MockServer::start().await;
        mount_login(&server, 500, "boom").await;
        let cache = test_cache(&server.uri(), &MockClock::new());

        assert!(cache.get_session().await.is_err());
        assert_eq!(login_count(&server).await, 1);

        // Next call retries from scratch, once
        assert!(cache.get_session().await.is_err());
        assert_eq!(login_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_non_200_success_status_is_rejected() {
        let server = MockServer::start().await;
        mount_login(&server, 204, "").await;
        let cache = test_cache(&server.uri(), &MockClock::new());

        let result = cache.get_session().await;
        assert!(matches!(
            result,
            Err(SessionError::LoginRejected { status: 204, .. })
        ));
    }

    #[tokio::test]
    async fn test_signing_error_makes_no_network_call() {
        let server = MockServer::start().await;
        mount_login(&server, 200, "{}").await;
        let cache = SessionCache::with_clock(
            Credentials::new(
                "test-key-id".to_string(),
                SecretString::from("garbage"),
                "PRJ-TEST".to_string(),
            ),
            GatewaySettings::new(server.uri()),
            Arc::new(MockClock::new()),
        );

        let result = cache.get_session().await;

        assert!(matches!(result, Err(SessionError::Signing(_))));
        assert_eq!(login_count(&server).await, 0);
        assert!(cache.current().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_http_error() {
        // Port 1 on localhost is not expected to accept connections
        let cache = test_cache("http://127.0.0.1:1", &MockClock::new());

        let result = cache.get_session().await;
        assert!(matches!(result, Err(SessionError::HttpError(_))));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
            .mount(&server)
            .await;
        let cache = Arc::new(test_cache(&server.uri(), &MockClock::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_session().await.unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(login_count(&server).await, 1);
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_waiters_share_failed_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_string("gateway busy")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let cache = Arc::new(test_cache(&server.uri(), &MockClock::new()));

        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_session().await })
            })
            .collect();

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(
                result,
                Err(SessionError::LoginRejected { status: 503, ref body }) if body == "gateway busy"
            ));
        }

        // All waiters fail together after one attempt, not one after another
        assert_eq!(login_count(&server).await, 1);
        assert!(start.elapsed() < Duration::from_millis(1500));
        assert!(cache.current().await.is_none());

        // A caller arriving after the failure starts a fresh attempt
        assert!(cache.get_session().await.is_err());
        assert_eq!(login_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_waiters_share_timed_out_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let cache = Arc::new(SessionCache::with_clock(
            test_credentials(),
            GatewaySettings::new(server.uri()).with_http_timeout(Duration::from_millis(500)),
            Arc::new(MockClock::new()),
        ));

        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_session().await })
            })
            .collect();

        for handle in handles {
            assert!(matches!(
                handle.await.unwrap(),
                Err(SessionError::HttpError(_))
            ));
        }

        assert_eq!(login_count(&server).await, 1);
        assert!(start.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_session_keeps_login_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "gw_session=abc123; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/identity/v1/whoami"))
            .and(header("cookie", "gw_session=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"user": "me"})))
            .expect(1)
            .mount(&server)
            .await;

        let cache = test_cache(&server.uri(), &MockClock::new());
        let session = cache.get_session().await.unwrap();

        let response = session
            .client()
            .get(session.url("/identity/v1/whoami"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // =========================================================================
    // Invalidation Tests
    // =========================================================================

    #[tokio::test]
    async fn test_invalidate_clears_matching_session() {
        let server = MockServer::start().await;
        mount_login(&server, 200, "{}").await;
        let cache = test_cache(&server.uri(), &MockClock::new());

        let session = cache.get_session().await.unwrap();
        assert!(cache.invalidate(&session).await);
        assert_eq!(cache.state().await, CacheState::Empty);

        let next = cache.get_session().await.unwrap();
        assert!(!Arc::ptr_eq(&session, &next));
        assert_eq!(login_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_invalidate_ignores_replaced_session() {
        let server = MockServer::start().await;
        mount_login(&server, 200, "{}").await;
        let clock = MockClock::new();
        let cache = test_cache(&server.uri(), &clock);

        let old = cache.get_session().await.unwrap();
        clock.advance_secs(TTL_SECS);
        let new = cache.get_session().await.unwrap();

        assert!(!cache.invalidate(&old).await);
        let current = cache.current().await.unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }
}
