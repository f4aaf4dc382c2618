//! App identity assertion minting.
//!
//! A GitHub App authenticates *as itself* with a short-lived JWT signed by
//! its private key: `{iat: now, exp: now + 600, iss: app_id}` under RS256
//! (600 seconds is GitHub's maximum validity). The assertion is the bearer
//! credential for the token-exchange and installation-listing endpoints.
//!
//! Every mint re-resolves and re-parses the configured key. Signing is
//! cheap next to the network round-trip that follows it, so mints are not
//! memoized; callers that mint in a loop pay the parse each time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, Header};
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::SigningError;
use crate::keys;

/// Validity window of an app identity assertion, in seconds.
pub const ASSERTION_VALIDITY_SECS: i64 = 600;

/// Registered claims carried by the assertion.
#[derive(Debug, Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// A minted app identity assertion.
///
/// Holds the compact JWT plus the instants baked into its claims. Created
/// fresh on every mint; never reused past its validity window.
#[derive(Clone)]
pub struct AppJwt {
    token: String,
    /// The `iat` claim.
    pub issued_at: DateTime<Utc>,
    /// The `exp` claim, exactly [`ASSERTION_VALIDITY_SECS`] after `issued_at`.
    pub expires_at: DateTime<Utc>,
}

impl AppJwt {
    /// The compact JWT, for use as a bearer credential.
    pub fn token(&self) -> &str {
        &self.token
    }
}

// Custom Debug to avoid exposing the signed token
impl std::fmt::Debug for AppJwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppJwt")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Mints app identity assertions from the configured private key.
#[derive(Clone)]
pub struct IdentityMinter {
    config: Arc<AppConfig>,
}

impl IdentityMinter {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    /// Mint an assertion valid from now.
    ///
    /// # Errors
    ///
    /// [`SigningError::Key`] when the key cannot be resolved,
    /// [`SigningError::Jwt`] when the signing operation fails.
    pub fn mint(&self) -> Result<AppJwt, SigningError> {
        self.mint_at(Utc::now())
    }

    /// Mint an assertion valid from an explicit instant.
    ///
    /// Claims carry unix-second precision; sub-second components of `now`
    /// are dropped.
    pub fn mint_at(&self, now: DateTime<Utc>) -> Result<AppJwt, SigningError> {
        let key = keys::resolve_signing_key(&self.config)?;

        let iat = now.timestamp();
        let claims = Claims {
            iat,
            exp: iat + ASSERTION_VALIDITY_SECS,
            iss: self.config.app_id.clone(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key.encoding_key())
            .map_err(|err| SigningError::Jwt(err.to_string()))?;

        debug!("minted app identity JWT (valid {}s)", ASSERTION_VALIDITY_SECS);

        let issued_at = DateTime::from_timestamp(claims.iat, 0).unwrap_or(now);
        let expires_at = issued_at + Duration::seconds(ASSERTION_VALIDITY_SECS);
        Ok(AppJwt {
            token,
            issued_at,
            expires_at,
        })
    }
}
