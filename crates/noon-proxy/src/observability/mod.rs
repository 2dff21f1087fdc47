//! Observability for the proxy.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
