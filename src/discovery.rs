//! Installation discovery.
//!
//! Installation ids are only learned transiently (from the install
//! callback), and the credential cache is memory-only, so a process restart
//! forgets every installation. Discovery recovers them by listing the
//! installations currently granted to the app via `GET /app/installations`,
//! authenticated with the app identity JWT.
//!
//! Discovery is a best-effort recovery probe invoked from status and
//! health-check paths: it must never propagate an error. Failures of any
//! kind (unconfigured key, transport, non-success status) produce an empty
//! listing with the reason carried in the returned [`Discovery`] and
//! retrievable afterwards via [`InstallationDiscovery::last_error`].

use std::sync::{Arc, RwLock};

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::api;
use crate::config::AppConfig;
use crate::jwt::IdentityMinter;

/// An installation currently granted to the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    /// Installation id, as assigned by GitHub.
    pub id: String,
    /// Login of the account (user or org) that owns the installation.
    pub account_login: Option<String>,
}

/// Outcome of a discovery pass: the records found plus the failure reason,
/// if the pass failed. A failed pass always carries zero records.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub installations: Vec<InstallationRecord>,
    pub error: Option<String>,
}

impl Discovery {
    fn failed(reason: String) -> Self {
        Self {
            installations: Vec::new(),
            error: Some(reason),
        }
    }

    /// True when the pass failed (as opposed to succeeding with no
    /// installations).
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Wire shape of one entry in the installations listing. Entries missing an
/// id are skipped; a missing account login is tolerated.
#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: Option<u64>,
    account: Option<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    login: Option<String>,
}

/// Lists the app's installations for cold-start recovery.
pub struct InstallationDiscovery {
    config: Arc<AppConfig>,
    minter: IdentityMinter,
    client: Client,
    last_error: RwLock<Option<String>>,
}

impl InstallationDiscovery {
    pub fn new(config: Arc<AppConfig>, client: Client) -> Self {
        let minter = IdentityMinter::new(Arc::clone(&config));
        Self {
            config,
            minter,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// List all installations granted to the app.
    ///
    /// Never fails outward: any error yields an empty listing with the
    /// reason in [`Discovery::error`], and clears/overwrites the stored
    /// last error.
    pub async fn list_installations(&self) -> Discovery {
        match self.try_list().await {
            Ok(installations) => {
                self.set_last_error(None);
                Discovery {
                    installations,
                    error: None,
                }
            }
            Err(reason) => {
                warn!(%reason, "failed to list GitHub App installations");
                self.set_last_error(Some(reason.clone()));
                Discovery::failed(reason)
            }
        }
    }

    /// The failure reason of the most recent pass, if it failed.
    ///
    /// Diagnostic accessor for status endpoints; the same reason is already
    /// returned inline on the failing [`Discovery`].
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|err| err.clone())
    }

    fn set_last_error(&self, reason: Option<String>) {
        if let Ok(mut last) = self.last_error.write() {
            *last = reason;
        }
    }

    async fn try_list(&self) -> Result<Vec<InstallationRecord>, String> {
        let jwt = self.minter.mint().map_err(|err| err.to_string())?;

        let url = format!(
            "{}/app/installations",
            self.config.api_base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .headers(api::github_headers())
            .bearer_auth(jwt.token())
            .send()
            .await
            .map_err(|err| format!("network error: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("GitHub API {status}: {body}"));
        }

        let entries: Vec<RawInstallation> = response
            .json()
            .await
            .map_err(|err| format!("malformed installations response: {err}"))?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id?;
                Some(InstallationRecord {
                    id: id.to_string(),
                    account_login: entry.account.and_then(|account| account.login),
                })
            })
            .collect())
    }
}

impl std::fmt::Debug for InstallationDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationDiscovery")
            .field("api_base_url", &self.config.api_base_url)
            .field("last_error", &self.last_error())
            .finish_non_exhaustive()
    }
}
