//! Noon gateway proxy library.
//!
//! A small HTTP service that stands between internal clients and the partner
//! API gateway. It logs in with a signed RS256 assertion, keeps the
//! authenticated session for its TTL, and forwards a fixed table of business
//! operations over that session, relaying upstream answers unchanged.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/forwarder.rs -> gateway_auth::SessionCache
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `endpoints` - Table of forwarded operations
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Response models
//! - `observability` - Metrics definitions
//! - `routes` - Axum router setup
//! - `services` - Gateway forwarding

pub mod config;
pub mod endpoints;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
