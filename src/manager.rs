//! Collaborator-facing facade over the credential core.
//!
//! REST handlers, webhook receivers and ingestion services depend on
//! [`AppAuthManager`] rather than on the individual components. The manager
//! owns one process-scoped [`TokenCache`] (or a caller-supplied one) and
//! wires the minter, broker, discovery and webhook verifier around it.
//!
//! # Cold start
//!
//! Installation ids arrive on the install callback and live only in the
//! cache, so a restarted process knows none. Paths that need a default
//! installation call [`ensure_installation`](AppAuthManager::ensure_installation),
//! which runs a discovery pass when the cache is empty and records the
//! first installation found with a placeholder row, so the next broker
//! call performs the actual token exchange.

use std::sync::Arc;

use tracing::info;

use crate::api;
use crate::broker::{InstallationTokenProvider, TokenBroker};
use crate::cache::TokenCache;
use crate::config::AppConfig;
use crate::discovery::{Discovery, InstallationDiscovery};
use crate::error::{SigningError, TokenExchangeError};
use crate::jwt::{AppJwt, IdentityMinter};
use crate::webhook::WebhookVerifier;

/// Entry point for everything collaborators need from the credential core.
pub struct AppAuthManager {
    config: Arc<AppConfig>,
    cache: Arc<TokenCache>,
    minter: IdentityMinter,
    broker: TokenBroker,
    discovery: InstallationDiscovery,
    verifier: WebhookVerifier,
}

impl AppAuthManager {
    /// Create a manager with its own process-scoped cache.
    ///
    /// # Errors
    ///
    /// [`TokenExchangeError::Network`] when the HTTP client cannot be
    /// initialized.
    pub fn new(config: AppConfig) -> Result<Self, TokenExchangeError> {
        Self::with_cache(Arc::new(config), Arc::new(TokenCache::new()))
    }

    /// Create a manager around an externally owned cache.
    ///
    /// # Errors
    ///
    /// [`TokenExchangeError::Network`] when the HTTP client cannot be
    /// initialized.
    pub fn with_cache(
        config: Arc<AppConfig>,
        cache: Arc<TokenCache>,
    ) -> Result<Self, TokenExchangeError> {
        let client = api::http_client().map_err(|err| TokenExchangeError::Network(err.to_string()))?;

        let minter = IdentityMinter::new(Arc::clone(&config));
        let broker = TokenBroker::new(Arc::clone(&config), Arc::clone(&cache), client.clone());
        let discovery = InstallationDiscovery::new(Arc::clone(&config), client);
        let verifier = WebhookVerifier::from_config(&config);

        Ok(Self {
            config,
            cache,
            minter,
            broker,
            discovery,
            verifier,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the credential cache shared with the broker.
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Mint a fresh app identity assertion.
    pub fn mint_app_jwt(&self) -> Result<AppJwt, SigningError> {
        self.minter.mint()
    }

    /// Get a usable access token for a specific installation.
    pub async fn installation_token(
        &self,
        installation_id: &str,
    ) -> Result<String, TokenExchangeError> {
        self.broker.installation_token(installation_id).await
    }

    /// Get a usable access token for the default installation, recovering
    /// one via discovery first if none is known.
    ///
    /// # Errors
    ///
    /// [`TokenExchangeError::MissingInstallation`] when no installation is
    /// known and discovery found none; otherwise as
    /// [`installation_token`](Self::installation_token).
    pub async fn latest_installation_token(&self) -> Result<String, TokenExchangeError> {
        let installation_id = self
            .ensure_installation()
            .await
            .ok_or(TokenExchangeError::MissingInstallation)?;
        self.broker.installation_token(&installation_id).await
    }

    /// Make sure some installation id is known, returning the default one.
    ///
    /// When the cache is empty, runs a discovery pass and records the first
    /// installation found (placeholder row only; the token exchange is
    /// left to the next broker call). No-op when the cache already has
    /// entries. Returns `None` when nothing is known and recovery found
    /// nothing; discovery failures degrade to that same `None`.
    pub async fn ensure_installation(&self) -> Option<String> {
        if !self.cache.has_any() {
            let discovery = self.discovery.list_installations().await;
            if let Some(first) = discovery.installations.first() {
                info!(
                    installation_id = %first.id,
                    account = first.account_login.as_deref().unwrap_or("<unknown>"),
                    "recovered installation from discovery"
                );
                self.cache.record_installation(&first.id);
            }
        }
        self.cache.latest_installation_id()
    }

    /// List all installations granted to the app. Never fails; see
    /// [`Discovery`].
    pub async fn list_installations(&self) -> Discovery {
        self.discovery.list_installations().await
    }

    /// Failure reason of the most recent discovery pass, for status
    /// endpoints.
    pub fn last_discovery_error(&self) -> Option<String> {
        self.discovery.last_error()
    }

    /// Record an installation id learned from the install callback.
    pub fn record_installation(&self, installation_id: &str) {
        info!(installation_id, "recording GitHub App installation");
        self.cache.record_installation(installation_id);
    }

    /// Check whether any installation is known.
    pub fn has_any_installation(&self) -> bool {
        self.cache.has_any()
    }

    /// Drop all cached installation ids and tokens.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Verify an inbound webhook delivery. See [`WebhookVerifier::verify`].
    pub fn verify_webhook(&self, payload: &[u8], signature_header: &str) -> bool {
        self.verifier.verify(payload, signature_header)
    }

    /// Public URL where users install the app.
    pub fn installation_url(&self) -> String {
        self.config.installation_url()
    }
}

impl std::fmt::Debug for AppAuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAuthManager")
            .field("app_id", &self.config.app_id)
            .field("has_installation", &self.has_any_installation())
            .finish_non_exhaustive()
    }
}
