//! Login token minting.
//!
//! Builds the signed assertion the gateway's identity service expects at
//! login: an RS256 JWT over `{sub, iat, jti}` where
//!
//! - `sub` is the key identifier
//! - `iat` is the current Unix time in whole seconds
//! - `jti` is a fresh v4 UUID, unique per mint
//!
//! The token carries no `exp`; the gateway enforces its own acceptance window.
//!
//! # Security
//!
//! - The private key is only exposed to the signer, never logged
//! - The `sub` field is redacted in `Debug` output of [`LoginClaims`]
//! - Minted tokens are returned as `SecretString`

use crate::clock::Clock;
use crate::credentials::Credentials;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Signature algorithm required by the gateway identity service.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Errors that can occur while minting a login token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The private key could not be parsed as an RSA PEM key.
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    /// The signer rejected the payload.
    #[error("Token signing failed: {0}")]
    SigningFailed(String),
}

/// Claims of a login assertion.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginClaims {
    /// Subject (key identifier) - redacted in Debug output.
    pub sub: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Unique token identifier.
    pub jti: String,
}

impl fmt::Debug for LoginClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginClaims")
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("jti", &self.jti)
            .finish()
    }
}

impl LoginClaims {
    /// Build claims for `key_id` issued at `iat`, with a fresh nonce.
    #[must_use]
    pub fn new(key_id: &str, iat: i64) -> Self {
        Self {
            sub: key_id.to_string(),
            iat,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// Produces signed login tokens from fixed credentials.
#[derive(Clone)]
pub struct TokenMinter {
    credentials: Arc<Credentials>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenMinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMinter")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl TokenMinter {
    /// Create a minter over `credentials`, taking time from `clock`.
    #[must_use]
    pub fn new(credentials: Arc<Credentials>, clock: Arc<dyn Clock>) -> Self {
        Self { credentials, clock }
    }

    /// Fresh claims for the current instant.
    #[must_use]
    pub fn claims(&self) -> LoginClaims {
        LoginClaims::new(self.credentials.key_id(), self.clock.now().timestamp())
    }

    /// Mint a signed login token.
    ///
    /// The key is parsed on every call; a malformed key surfaces here rather
    /// than at startup.
    ///
    /// # Errors
    ///
    /// - `SigningError::InvalidKey` if the private key is not a valid RSA PEM
    /// - `SigningError::SigningFailed` if RS256 signing fails
    #[instrument(skip_all, name = "gateway_auth.mint")]
    pub fn mint(&self) -> Result<SecretString, SigningError> {
        let claims = self.claims();
        let token = sign_claims(self.credentials.private_key(), &claims)?;

        debug!(
            target: "gateway_auth.minter",
            iat = claims.iat,
            jti = %claims.jti,
            "Login token minted"
        );

        Ok(SecretString::from(token))
    }
}

/// Sign `claims` with an RSA private key in PEM form.
///
/// # Errors
///
/// See [`TokenMinter::mint`].
pub fn sign_claims(private_key: &SecretString, claims: &LoginClaims) -> Result<String, SigningError> {
    let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes()).map_err(|e| {
        warn!(target: "gateway_auth.minter", error = %e, "Failed to parse signing key");
        SigningError::InvalidKey(e.to_string())
    })?;

    jsonwebtoken::encode(&Header::new(SIGNING_ALGORITHM), claims, &key).map_err(|e| {
        warn!(target: "gateway_auth.minter", error = %e, "Failed to sign login token");
        SigningError::SigningFailed(e.to_string())
    })
}
