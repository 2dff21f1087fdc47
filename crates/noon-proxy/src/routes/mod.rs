//! HTTP routes for the proxy.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::endpoints::ENDPOINTS;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::Forwarder;
use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, on},
    Router,
};
use bytes::Bytes;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Inbound request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Forwarder over the process-wide session cache.
    pub forwarder: Arc<Forwarder>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/ping`, `/` - Liveness (never touches the gateway)
/// - `/metrics` - Prometheus metrics
/// - `/login` - Gateway connectivity check (login + whoami)
/// - One route per row of [`ENDPOINTS`], forwarded to the gateway
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let mut gateway_routes = Router::new().route("/login", get(handlers::login_check));

    for endpoint in ENDPOINTS {
        gateway_routes = gateway_routes.route(
            endpoint.path,
            on(
                endpoint.method.filter(),
                move |State(state): State<Arc<AppState>>,
                      params: Option<Path<HashMap<String, String>>>,
                      body: Bytes| async move {
                    let params = params.map(|Path(params)| params).unwrap_or_default();
                    handlers::forward_endpoint(state, endpoint, params, body).await
                },
            ),
        );
    }

    let gateway_routes = gateway_routes.with_state(state);

    let health_routes = Router::new()
        .route("/", get(handlers::ping))
        .route("/ping", get(handlers::ping));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    health_routes
        .merge(metrics_routes)
        .merge(gateway_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}
