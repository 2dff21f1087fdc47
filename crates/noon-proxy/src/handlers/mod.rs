//! HTTP request handlers for the proxy.

pub mod forward;
pub mod health;
pub mod identity;
pub mod metrics;

pub use forward::forward_endpoint;
pub use health::ping;
pub use identity::login_check;
pub use metrics::metrics_handler;
