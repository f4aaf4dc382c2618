//! Error types for the credential core.
//!
//! # Design
//!
//! Each concern gets its own error enum: key resolution failures are fatal
//! to a mint call and never retried, signing wraps them, and token exchange
//! surfaces partner-API failures to the caller without internal retries.
//! Discovery failures do not appear here: discovery absorbs
//! its failures and reports them as data (see [`crate::discovery`]).
//!
//! Error messages never contain token values or key material.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from resolving the configured private key into a signing key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Neither an inline key value nor a key path is configured.
    #[error("GitHub App private key is not configured")]
    Unconfigured,

    /// The configured key path does not exist.
    #[error("private key path does not exist: {0}")]
    Missing(PathBuf),

    /// The configured key path exists but is not a regular file.
    #[error("private key path is not a file: {0}")]
    NotAFile(PathBuf),

    /// Reading the key file failed.
    #[error("failed to read private key from {path}: {source}")]
    Unreadable {
        /// The configured key path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The key material matched none of the accepted encodings, or matched
    /// one but failed to parse as an RSA private key.
    #[error("unparseable private key: {0}")]
    Unparseable(String),
}

/// Errors from minting an app identity assertion.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The private key could not be resolved.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The key resolved but the signing operation failed.
    #[error("JWT signing failed: {0}")]
    Jwt(String),
}

/// Errors from exchanging an app identity assertion for an installation
/// access token.
#[derive(Debug, Error)]
pub enum TokenExchangeError {
    /// Minting the app identity assertion failed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Transport-level failure reaching the GitHub API (includes timeouts).
    #[error("network error: {0}")]
    Network(String),

    /// GitHub returned a non-success status for the exchange.
    #[error("GitHub API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body from GitHub
        message: String,
    },

    /// The exchange succeeded but the response body was not usable.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// No installation id is known and discovery found none to recover.
    #[error("no GitHub App installation found. Install the app first.")]
    MissingInstallation,
}

impl TokenExchangeError {
    /// Check if this error is a transient failure that might succeed on retry.
    ///
    /// Network failures and 5xx responses are transient; signing failures,
    /// 4xx responses, and malformed payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            TokenExchangeError::Network(_) => true,
            TokenExchangeError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error indicates the app's own credentials are bad
    /// (misconfigured key or a rejected identity assertion).
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            TokenExchangeError::Signing(_) | TokenExchangeError::Api { status: 401, .. }
        )
    }
}

impl From<reqwest::Error> for TokenExchangeError {
    fn from(err: reqwest::Error) -> Self {
        TokenExchangeError::Network(err.to_string())
    }
}
