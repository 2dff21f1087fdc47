//! HTTP metrics middleware.
//!
//! Records every response, including framework-level errors produced before
//! a handler runs (404 Not Found, 405 Method Not Allowed, 408 timeout).

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Middleware that records request method, matched route, status and
/// duration.
///
/// The route template (e.g. `/po/:id`) is used as the endpoint label, so
/// path parameters never reach metric labels.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        endpoint.as_deref(),
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use metrics_util::debugging::DebuggingRecorder;
    use tower::ServiceExt;

    async fn handler_200() -> &'static str {
        "OK"
    }

    async fn handler_502() -> (StatusCode, &'static str) {
        (StatusCode::BAD_GATEWAY, "Error")
    }

    fn test_app() -> Router {
        Router::new()
            .route("/po/:id", get(handler_200))
            .route("/error", get(handler_502))
            .route_layer(middleware::from_fn(http_metrics_middleware))
    }

    async fn send(app: Router, method: &str, uri: &str) -> StatusCode {
        let request = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request builder should succeed");

        app.oneshot(request)
            .await
            .expect("request should succeed")
            .status()
    }

    #[tokio::test]
    async fn test_middleware_passes_success_through() {
        assert_eq!(send(test_app(), "GET", "/po/PO1").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_passes_error_through() {
        assert_eq!(send(test_app(), "GET", "/error").await, StatusCode::BAD_GATEWAY);
    }

    /// Runs one request against `app` with a local debugging recorder and
    /// returns the `endpoint` label of the request counter.
    fn recorded_endpoint(app: Router, uri: &str) -> Option<String> {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime should build")
                .block_on(send(app, "GET", uri))
        });

        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| key.key().name() == "proxy_http_requests_total")
            .and_then(|(key, _, _, _)| {
                key.key()
                    .labels()
                    .find(|label| label.key() == "endpoint")
                    .map(|label| label.value().to_string())
            })
    }

    #[test]
    fn test_endpoint_label_is_route_template() {
        let endpoint = recorded_endpoint(test_app(), "/po/PO1");

        assert_eq!(endpoint.as_deref(), Some("/po/:id"));
    }

    #[test]
    fn test_unmatched_path_labelled_other() {
        let app = Router::new()
            .route("/po/:id", get(handler_200))
            .layer(middleware::from_fn(http_metrics_middleware));

        let endpoint = recorded_endpoint(app, "/nonexistent/PO1");

        assert_eq!(endpoint.as_deref(), Some("/other"));
    }

    #[tokio::test]
    async fn test_middleware_outer_layer_sees_not_found() {
        let app = Router::new()
            .route("/po/:id", get(handler_200))
            .layer(middleware::from_fn(http_metrics_middleware));

        assert_eq!(send(app, "GET", "/nonexistent").await, StatusCode::NOT_FOUND);
    }
}
