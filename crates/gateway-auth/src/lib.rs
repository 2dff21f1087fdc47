//! Authentication against the partner API gateway.
//!
//! Mints RS256-signed login assertions and caches the authenticated gateway
//! session for a fixed TTL.

#![warn(clippy::pedantic)]

/// Module for the injectable clock used by TTL checks and claim timestamps
pub mod clock;

/// Module for the static gateway credentials
pub mod credentials;

/// Module for signed login token construction
pub mod minter;

/// Module for the authenticated session cache
pub mod session;

/// Module for test fixtures (mock clock, RSA keys)
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use credentials::Credentials;
pub use minter::{LoginClaims, SigningError, TokenMinter};
pub use session::{
    is_valid, CacheState, GatewaySettings, Session, SessionCache, SessionError, SESSION_TTL,
};
