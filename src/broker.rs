//! Installation access token brokering.
//!
//! # Flow
//!
//! 1. Check [`TokenCache`] for a live token; a hit performs no network I/O.
//! 2. On miss, mint a fresh app identity JWT.
//! 3. `POST /app/installations/{id}/access_tokens` with the JWT as bearer
//!    credential; installation tokens come back with a ~1 hour expiry.
//! 4. Write the token and its expiry into the cache, return the token.
//!
//! # Concurrency caveat
//!
//! Token acquisition is not serialized per installation id. Two callers
//! that both observe a miss will both mint and both call the exchange
//! endpoint; their results race on the cache write and the last writer
//! wins, discarding one network call's result. The duplicate exchange is
//! harmless (both tokens are valid) and tolerated.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::api;
use crate::cache::TokenCache;
use crate::config::AppConfig;
use crate::error::TokenExchangeError;
use crate::jwt::IdentityMinter;

/// Trait for providing installation access tokens to API callers.
///
/// The broker is the only production implementation; collaborators depend
/// on the trait so tests can substitute a canned provider.
#[async_trait]
pub trait InstallationTokenProvider: Send + Sync {
    /// Returns a usable access token for the installation, exchanging a
    /// fresh one only when the cache has no live entry.
    ///
    /// # Errors
    ///
    /// [`TokenExchangeError`] on signing failure, transport failure, or a
    /// non-success response from GitHub. Failures are not retried here.
    async fn installation_token(&self, installation_id: &str)
        -> Result<String, TokenExchangeError>;
}

/// Success payload of the token exchange endpoint.
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: String,
}

/// Cache-aside broker for installation access tokens.
pub struct TokenBroker {
    config: Arc<AppConfig>,
    cache: Arc<TokenCache>,
    minter: IdentityMinter,
    client: Client,
}

impl TokenBroker {
    pub fn new(config: Arc<AppConfig>, cache: Arc<TokenCache>, client: Client) -> Self {
        let minter = IdentityMinter::new(Arc::clone(&config));
        Self {
            config,
            cache,
            minter,
            client,
        }
    }

    fn exchange_url(&self, installation_id: &str) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.config.api_base_url.trim_end_matches('/'),
            installation_id
        )
    }

    /// Mint an identity assertion and exchange it for an installation token.
    async fn exchange(
        &self,
        installation_id: &str,
    ) -> Result<(String, DateTime<Utc>), TokenExchangeError> {
        let jwt = self.minter.mint()?;

        let response = self
            .client
            .post(self.exchange_url(installation_id))
            .headers(api::github_headers())
            .bearer_auth(jwt.token())
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TokenExchangeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: AccessTokenResponse = response
            .json()
            .await
            .map_err(|err| TokenExchangeError::MalformedResponse(err.to_string()))?;

        let expires_at = DateTime::parse_from_rfc3339(&payload.expires_at)
            .map_err(|err| {
                TokenExchangeError::MalformedResponse(format!(
                    "bad expires_at '{}': {}",
                    payload.expires_at, err
                ))
            })?
            .with_timezone(&Utc);

        Ok((payload.token, expires_at))
    }
}

#[async_trait]
impl InstallationTokenProvider for TokenBroker {
    async fn installation_token(
        &self,
        installation_id: &str,
    ) -> Result<String, TokenExchangeError> {
        if let Some(token) = self.cache.get(installation_id) {
            debug!(installation_id, "using cached installation token");
            return Ok(token);
        }

        info!(installation_id, "requesting new installation token");
        let (token, expires_at) = self.exchange(installation_id).await?;

        info!(%expires_at, "obtained installation token");
        // Last writer wins under concurrent misses; see the module docs.
        self.cache
            .put(installation_id, token.clone(), expires_at);

        Ok(token)
    }
}

// Custom Debug to avoid exposing anything derived from key material
impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("api_base_url", &self.config.api_base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn broker_for(base_url: &str) -> TokenBroker {
        let config = Arc::new(
            AppConfig::new("123", "app", SecretString::from("s".to_string()))
                .with_api_base_url(base_url),
        );
        TokenBroker::new(config, Arc::new(TokenCache::new()), Client::new())
    }

    #[test]
    fn exchange_url_format() {
        let broker = broker_for("https://api.github.com");
        assert_eq!(
            broker.exchange_url("42"),
            "https://api.github.com/app/installations/42/access_tokens"
        );
    }

    #[test]
    fn exchange_url_tolerates_trailing_slash() {
        let broker = broker_for("http://127.0.0.1:8080/");
        assert_eq!(
            broker.exchange_url("42"),
            "http://127.0.0.1:8080/app/installations/42/access_tokens"
        );
    }

    #[test]
    fn access_token_response_deserialize() {
        let json = r#"{
            "token": "ghs_abc123",
            "expires_at": "2025-12-25T15:00:00Z",
            "permissions": { "contents": "read" },
            "repository_selection": "all"
        }"#;

        let response: AccessTokenResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(response.token, "ghs_abc123");
        assert_eq!(response.expires_at, "2025-12-25T15:00:00Z");
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network_entirely() {
        // Unroutable base URL: any network attempt would error out.
        let broker = broker_for("http://127.0.0.1:1");
        broker.cache.put(
            "42",
            "tok-live".to_string(),
            Utc::now() + chrono::Duration::hours(1),
        );

        let token = broker.installation_token("42").await.expect("cached token");
        assert_eq!(token, "tok-live");
    }

    #[tokio::test]
    async fn miss_without_key_fails_before_any_request() {
        let broker = broker_for("http://127.0.0.1:1");
        let err = broker
            .installation_token("42")
            .await
            .expect_err("no key configured");
        assert!(matches!(err, TokenExchangeError::Signing(_)));
    }
}
