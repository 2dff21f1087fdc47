//! Generic handler for every row of the endpoint table.

use crate::endpoints::Endpoint;
use crate::errors::ProxyError;
use crate::routes::AppState;
use crate::services::UpstreamResponse;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Forward one inbound request to the gateway and relay the answer.
///
/// # Errors
///
/// - `ProxyError::BadRequest` for a missing/non-JSON body or an unsafe
///   path parameter
/// - Session and transport failures from the forwarder
pub async fn forward_endpoint(
    state: Arc<AppState>,
    endpoint: &'static Endpoint,
    params: HashMap<String, String>,
    body: Bytes,
) -> Result<UpstreamResponse, ProxyError> {
    let body = request_body(endpoint, body)?;
    state.forwarder.forward(endpoint, &params, body).await
}

/// Body to forward: `None` for bodiless operations, otherwise the inbound
/// bytes once they are known to be JSON.
fn request_body(endpoint: &Endpoint, body: Bytes) -> Result<Option<Bytes>, ProxyError> {
    if !endpoint.requires_body {
        return Ok(None);
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ProxyError::BadRequest(
            "Request body must be a JSON document".to_string(),
        ));
    }

    serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(|e| {
        ProxyError::BadRequest(format!("Request body is not valid JSON: {e}"))
    })?;

    Ok(Some(body))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::endpoints;

    #[test]
    fn test_bodiless_endpoint_drops_body() {
        let endpoint = endpoints::find("whoami").unwrap();
        let body = request_body(endpoint, Bytes::from_static(b"ignored")).unwrap();

        assert!(body.is_none());
    }

    #[test]
    fn test_json_body_forwarded_unchanged() {
        let endpoint = endpoints::find("stock_list").unwrap();
        let raw = Bytes::from_static(b"{ \"skus\" : [\"A\", \"B\"] }");

        let body = request_body(endpoint, raw.clone()).unwrap();

        assert_eq!(body, Some(raw));
    }

    #[test]
    fn test_empty_body_rejected() {
        let endpoint = endpoints::find("stock_update").unwrap();

        for raw in [&b""[..], b"   \n"] {
            let result = request_body(endpoint, Bytes::copy_from_slice(raw));
            assert!(matches!(result, Err(ProxyError::BadRequest(_))));
        }
    }

    #[test]
    fn test_non_json_body_rejected() {
        let endpoint = endpoints::find("shipment_create").unwrap();
        let result = request_body(endpoint, Bytes::from_static(b"sku=ABC&qty=5"));

        assert!(matches!(result, Err(ProxyError::BadRequest(_))));
    }

    #[test]
    fn test_json_scalar_body_accepted() {
        // The gateway decides what shapes it accepts
        let endpoint = endpoints::find("orders_list").unwrap();
        let body = request_body(endpoint, Bytes::from_static(b"[]")).unwrap();

        assert!(body.is_some());
    }
}
