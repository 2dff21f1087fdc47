//! Static gateway credentials.

use secrecy::SecretString;
use std::fmt;

/// Credentials issued by the partner gateway for one project.
///
/// Loaded once at startup and immutable afterwards. The private key is held
/// as a [`SecretString`] and redacted in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    key_id: String,
    private_key: SecretString,
    project_code: String,
}

impl Credentials {
    /// Create credentials from already un-escaped values.
    ///
    /// # Arguments
    ///
    /// * `key_id` - Key identifier, used as the token subject
    /// * `private_key` - PEM-encoded RSA private key
    /// * `project_code` - Default project code sent with every login
    #[must_use]
    pub fn new(key_id: String, private_key: SecretString, project_code: String) -> Self {
        Self {
            key_id,
            private_key,
            project_code,
        }
    }

    /// Key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// PEM-encoded private signing key.
    #[must_use]
    pub fn private_key(&self) -> &SecretString {
        &self.private_key
    }

    /// Default project code.
    #[must_use]
    pub fn project_code(&self) -> &str {
        &self.project_code
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("private_key", &"[REDACTED]")
            .field("project_code", &self.project_code)
            .finish()
    }
}
