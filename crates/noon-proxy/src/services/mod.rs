//! Service layer for the proxy.
//!
//! - `forwarder` - forwards operations to the gateway over the cached session

pub mod forwarder;

pub use forwarder::{Forwarder, UpstreamResponse};
