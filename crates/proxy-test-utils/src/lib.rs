//! # Proxy Test Utilities
//!
//! Shared test utilities for the Noon gateway proxy.
//!
//! This crate provides:
//! - Server test harness (`TestProxyServer` for E2E tests)
//! - Gateway mocks (`mock_gateway` helpers over `wiremock`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use proxy_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let gateway = wiremock::MockServer::start().await;
//!     mount_login_success(&gateway).await;
//!
//!     let server = TestProxyServer::spawn(&gateway.uri()).await?;
//!     let response = reqwest::get(format!("{}/ping", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod mock_gateway;
pub mod server_harness;

// Re-export commonly used items
pub use mock_gateway::*;
pub use server_harness::*;
