//! Forwarded endpoint table.
//!
//! Every business operation the proxy exposes is one row here. Routes are
//! generated from this table, so adding an operation never means writing a
//! new handler.

use crate::errors::ProxyError;
use axum::http::Method;
use axum::routing::MethodFilter;
use std::collections::HashMap;

/// HTTP method of a forwarded operation (same inbound and upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMethod {
    Get,
    Post,
}

impl ForwardMethod {
    /// Method used on the upstream call.
    pub fn as_method(self) -> Method {
        match self {
            ForwardMethod::Get => Method::GET,
            ForwardMethod::Post => Method::POST,
        }
    }

    /// Router filter for the inbound route.
    pub fn filter(self) -> MethodFilter {
        match self {
            ForwardMethod::Get => MethodFilter::GET,
            ForwardMethod::Post => MethodFilter::POST,
        }
    }
}

/// One forwarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Operation name, used as a metrics label and log field.
    pub name: &'static str,

    /// Inbound route (axum syntax, `:param` segments).
    pub path: &'static str,

    /// Method, shared by the inbound route and the upstream call.
    pub method: ForwardMethod,

    /// Upstream path template (`{param}` placeholders).
    pub upstream: &'static str,

    /// Whether a JSON request body is required and forwarded.
    pub requires_body: bool,
}

/// All forwarded operations.
pub const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: "whoami",
        path: "/whoami",
        method: ForwardMethod::Get,
        upstream: "/identity/v1/whoami",
        requires_body: false,
    },
    Endpoint {
        name: "stock_list",
        path: "/stock-list",
        method: ForwardMethod::Post,
        upstream: "/stock/v1/stock-list",
        requires_body: true,
    },
    Endpoint {
        name: "stock_update",
        path: "/stock-update",
        method: ForwardMethod::Post,
        upstream: "/stock/v1/stock-update",
        requires_body: true,
    },
    Endpoint {
        name: "order_get",
        path: "/fbpi-order/:id",
        method: ForwardMethod::Get,
        upstream: "/fbpi/v1/fbpi-order/{id}/get",
        requires_body: false,
    },
    Endpoint {
        name: "order_customer_details",
        path: "/fbpi-order/:id/customer-details",
        method: ForwardMethod::Get,
        upstream: "/fbpi/v1/fbpi-order/{id}/customer-details/get",
        requires_body: false,
    },
    Endpoint {
        name: "order_update",
        path: "/fbpi-order-update",
        method: ForwardMethod::Post,
        upstream: "/fbpi/v1/fbpi-order/update",
        requires_body: true,
    },
    Endpoint {
        name: "orders_list",
        path: "/fbpi-orders-list",
        method: ForwardMethod::Post,
        upstream: "/fbpi/v1/fbpi-orders/list",
        requires_body: true,
    },
    Endpoint {
        name: "shipment_create",
        path: "/shipment-create",
        method: ForwardMethod::Post,
        upstream: "/fbpi/v1/shipment/create",
        requires_body: true,
    },
    Endpoint {
        name: "shipment_cancel",
        path: "/shipment-cancel",
        method: ForwardMethod::Post,
        upstream: "/fbpi/v1/shipment/cancel",
        requires_body: true,
    },
    Endpoint {
        name: "shipment_get",
        path: "/shipment-get",
        method: ForwardMethod::Post,
        upstream: "/fbpi/v1/shipment/get",
        requires_body: true,
    },
    Endpoint {
        name: "noon_logistics_awbs",
        path: "/noon-logistics-awbs",
        method: ForwardMethod::Post,
        upstream: "/fbpi/v1/shipment/noon-logistics-awbs/get",
        requires_body: true,
    },
    Endpoint {
        name: "po_get",
        path: "/po/:id",
        method: ForwardMethod::Get,
        upstream: "/fbpo/v1/po/{id}/get",
        requires_body: false,
    },
];

/// Look up an endpoint by operation name.
pub fn find(name: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().find(|endpoint| endpoint.name == name)
}

impl Endpoint {
    /// Render the upstream path, substituting `{param}` placeholders.
    ///
    /// Parameter values must be non-empty and limited to `[A-Za-z0-9._-]`
    /// so they cannot change the upstream path structure.
    pub fn upstream_path(&self, params: &HashMap<String, String>) -> Result<String, ProxyError> {
        let mut rendered = String::with_capacity(self.upstream.len());
        let mut rest = self.upstream;

        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            rendered.push_str(literal);

            let close = tail.find('}').ok_or(ProxyError::Internal)?;
            let name = tail.get(1..close).ok_or(ProxyError::Internal)?;
            let value = params
                .get(name)
                .ok_or_else(|| ProxyError::BadRequest(format!("Missing path parameter '{name}'")))?;

            if !is_safe_segment(value) {
                return Err(ProxyError::BadRequest(format!(
                    "Invalid path parameter '{name}'"
                )));
            }

            rendered.push_str(value);
            rest = tail.get(close + 1..).unwrap_or_default();
        }

        rendered.push_str(rest);
        Ok(rendered)
    }
}

fn is_safe_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value != "."
        && value != ".."
}
