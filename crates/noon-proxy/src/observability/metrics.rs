//! Metrics definitions for the proxy.
//!
//! All metrics follow Prometheus naming conventions:
//! - `proxy_` prefix for proxy-level metrics
//! - `gateway_auth_` prefix for login metrics (recorded by `gateway-auth`)
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: matched route templates, or `/other`
//! - `operation`: rows of the endpoint table
//! - `status`: 3 values (success, error, timeout)
//! - `outcome`: bounded by the forwarding result (see [`UpstreamOutcome`])

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by the
/// `/metrics` route.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("proxy_http_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("proxy_upstream_call".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set upstream call buckets: {e}"))?
        // Login includes RSA signing plus one gateway round trip
        .set_buckets_for_metric(
            Matcher::Prefix("gateway_auth_login".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set login buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record inbound HTTP request completion.
///
/// Metric: `proxy_http_requests_total`, `proxy_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// `endpoint` should be the matched route template; pass `None` for
/// unmatched requests (404/405), which are folded into `/other`.
pub fn record_http_request(
    method: &str,
    endpoint: Option<&str>,
    status_code: u16,
    duration: Duration,
) {
    let endpoint = endpoint.unwrap_or("/other").to_string();
    let status = categorize_status_code(status_code);

    histogram!("proxy_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("proxy_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

// ============================================================================
// Upstream Call Metrics
// ============================================================================

/// Result of a forwarded gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOutcome {
    /// Gateway answered 2xx.
    Success,
    /// Gateway answered 401 or 403.
    Unauthorized,
    /// Gateway answered any other non-2xx status.
    Rejected,
    /// No session could be obtained.
    NoSession,
    /// The call did not complete.
    TransportError,
}

impl UpstreamOutcome {
    /// Classify a gateway status.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => UpstreamOutcome::Success,
            401 | 403 => UpstreamOutcome::Unauthorized,
            _ => UpstreamOutcome::Rejected,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            UpstreamOutcome::Success => "success",
            UpstreamOutcome::Unauthorized => "unauthorized",
            UpstreamOutcome::Rejected => "rejected",
            UpstreamOutcome::NoSession => "no_session",
            UpstreamOutcome::TransportError => "transport_error",
        }
    }
}

/// Record a forwarded gateway call.
///
/// Metric: `proxy_upstream_calls_total`, `proxy_upstream_call_duration_seconds`
/// Labels: `operation`, `outcome`
pub fn record_upstream_call(operation: &'static str, outcome: UpstreamOutcome, duration: Duration) {
    histogram!("proxy_upstream_call_duration_seconds",
        "operation" => operation,
        "outcome" => outcome.as_str()
    )
    .record(duration.as_secs_f64());

    counter!("proxy_upstream_calls_total",
        "operation" => operation,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a cached session dropped after a 401/403.
///
/// Metric: `proxy_session_invalidations_total`
pub fn record_session_invalidation(operation: &'static str) {
    counter!("proxy_session_invalidations_total", "operation" => operation).increment(1);
}
