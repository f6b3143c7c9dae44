//! Access token verification.
//!
//! Tokens are HS256 JWTs signed by an external issuer. The gate verifies the
//! signature with an injected key, checks expiry against the supplied clock and
//! hands back the store password carried in the claims.

use crate::error::AuthError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Store password bound to the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,

    /// Subject, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Store credential extracted from a verified token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    password: Option<String>,
    subject: Option<String>,
}

impl Credential {
    pub fn new(password: Option<String>) -> Self {
        Self {
            password,
            subject: None,
        }
    }

    /// Store password, if the token carried a non-empty one.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("subject", &self.subject)
            .finish()
    }
}

/// Verifies access tokens with a fixed key.
#[derive(Clone)]
pub struct CredentialGate {
    key: DecodingKey,
    leeway_secs: u64,
}

impl fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGate")
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl CredentialGate {
    /// Creates a gate that verifies HS256 signatures with `secret`.
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            leeway_secs,
        }
    }

    /// Verifies `token` against the current wall clock.
    pub fn authenticate(&self, token: &str) -> Result<Credential, AuthError> {
        self.authenticate_at(token, chrono::Utc::now().timestamp())
    }

    /// Verifies `token` as of `now` (Unix seconds).
    ///
    /// Signature and structure are checked first; a token that fails either is
    /// `Malformed` even if it is also expired.
    pub fn authenticate_at(&self, token: &str, now: i64) -> Result<Credential, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Malformed("token is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the caller's clock.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Claims>(token, &self.key, &validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::Malformed("invalid signature".to_string()),
            ErrorKind::InvalidAlgorithm => {
                AuthError::Malformed("unsupported signing algorithm".to_string())
            }
            _ => AuthError::Malformed(e.to_string()),
        })?;

        let claims = data.claims;
        if claims.exp.saturating_add(self.leeway_secs as i64) < now {
            return Err(AuthError::Expired);
        }

        Ok(Credential {
            password: claims.password.filter(|p| !p.is_empty()),
            subject: claims.sub,
        })
    }
}
