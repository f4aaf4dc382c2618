//! In-memory installation credential cache.
//!
//! # Design
//!
//! The cache maps installation ids to their access tokens and tracks the
//! most recently seen installation id as the default target (operation is
//! effectively single-tenant even though the map supports multiple keys).
//! Both live under one `RwLock` so the map and the latest-pointer always
//! update together.
//!
//! Nothing here is persisted: a process restart discards every entry, which
//! is why [`crate::discovery`] exists as a recovery path.
//!
//! # Rows without tokens
//!
//! A row may be inserted with no token and an epoch expiry, meaning "the
//! installation id is known but has not been exchanged for a token yet".
//! The installation callback and the discovery flow use this to register an
//! installation without a network round-trip; the first `get` for such a
//! row is a guaranteed miss, which sends the broker through the exchange.
//!
//! # Expiry
//!
//! `get` returns a token only while its expiry is strictly in the future.
//! Expired rows behave exactly like absent ones for readers, although the
//! row itself stays in the map until overwritten or cleared.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// A cached installation credential.
#[derive(Debug, Clone)]
pub struct InstallationToken {
    /// The opaque access token, or `None` while only the installation id
    /// is known.
    pub token: Option<String>,
    /// Absolute expiry instant of the token.
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// The token value, if present and live at `now`.
    fn live_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match &self.token {
            Some(token) if self.expires_at > now => Some(token),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, InstallationToken>,
    latest: Option<String>,
}

/// Concurrency-safe store of installation credentials.
///
/// Explicitly constructed by the embedder and shared via `Arc`; components
/// receive it by handle, never through a global.
#[derive(Debug, Default)]
pub struct TokenCache {
    state: RwLock<CacheState>,
}

impl TokenCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token for an installation, overwriting any existing row and
    /// making this installation the latest.
    pub fn put(&self, installation_id: &str, token: String, expires_at: DateTime<Utc>) {
        self.insert(
            installation_id,
            InstallationToken {
                token: Some(token),
                expires_at,
            },
        );
    }

    /// Register an installation id without a token.
    ///
    /// Writes a placeholder row (no token, epoch expiry) and makes this
    /// installation the latest. Every `get` on the row misses until a real
    /// token is `put`.
    pub fn record_installation(&self, installation_id: &str) {
        self.insert(
            installation_id,
            InstallationToken {
                token: None,
                expires_at: DateTime::<Utc>::UNIX_EPOCH,
            },
        );
    }

    fn insert(&self, installation_id: &str, entry: InstallationToken) {
        if let Ok(mut state) = self.state.write() {
            state.entries.insert(installation_id.to_string(), entry);
            state.latest = Some(installation_id.to_string());
        }
    }

    /// Get the live token for an installation.
    ///
    /// Returns `None` when the row is absent, has no token yet, or has
    /// expired.
    pub fn get(&self, installation_id: &str) -> Option<String> {
        self.get_at(installation_id, Utc::now())
    }

    /// `get` against an explicit clock instant.
    pub fn get_at(&self, installation_id: &str, now: DateTime<Utc>) -> Option<String> {
        let state = self.state.read().ok()?;
        state
            .entries
            .get(installation_id)
            .and_then(|entry| entry.live_token(now))
            .map(str::to_string)
    }

    /// The most recently recorded installation id.
    ///
    /// Falls back to any key present when no explicit latest was recorded.
    pub fn latest_installation_id(&self) -> Option<String> {
        let state = self.state.read().ok()?;
        state
            .latest
            .clone()
            .or_else(|| state.entries.keys().next().cloned())
    }

    /// Check whether any installation is known (live or not).
    pub fn has_any(&self) -> bool {
        self.state
            .read()
            .map(|state| !state.entries.is_empty())
            .unwrap_or(false)
    }

    /// Drop every row and the latest pointer.
    ///
    /// Dev/recovery helper for when a bad installation id was cached.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            state.entries.clear();
            state.latest = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_cache_is_empty() {
        let cache = TokenCache::new();
        assert!(!cache.has_any());
        assert!(cache.latest_installation_id().is_none());
        assert!(cache.get("7").is_none());
    }

    #[test]
    fn put_then_get() {
        let cache = TokenCache::new();
        cache.put("7", "tok-abc".to_string(), Utc::now() + Duration::hours(1));

        assert_eq!(cache.get("7"), Some("tok-abc".to_string()));
        assert_eq!(cache.latest_installation_id(), Some("7".to_string()));
        assert!(cache.has_any());
    }

    #[test]
    fn expired_token_reads_as_absent() {
        let cache = TokenCache::new();
        cache.put("7", "tok-abc".to_string(), Utc::now() - Duration::seconds(1));

        // The row exists (has_any is true) but readers see no token.
        assert!(cache.get("7").is_none());
        assert!(cache.has_any());
    }

    #[test]
    fn expiry_is_strictly_after() {
        let cache = TokenCache::new();
        let now = Utc::now();
        cache.put("7", "tok-abc".to_string(), now);

        // Expiry exactly at the read instant counts as expired.
        assert!(cache.get_at("7", now).is_none());
        assert_eq!(
            cache.get_at("7", now - Duration::seconds(1)),
            Some("tok-abc".to_string())
        );
    }

    #[test]
    fn placeholder_row_never_satisfies_get() {
        let cache = TokenCache::new();
        cache.record_installation("7");

        assert!(cache.get("7").is_none());
        assert!(cache.has_any());
        assert_eq!(cache.latest_installation_id(), Some("7".to_string()));
    }

    #[test]
    fn put_overwrites_placeholder() {
        let cache = TokenCache::new();
        cache.record_installation("7");
        cache.put("7", "tok-abc".to_string(), Utc::now() + Duration::hours(1));

        assert_eq!(cache.get("7"), Some("tok-abc".to_string()));
    }

    #[test]
    fn put_updates_latest_pointer() {
        let cache = TokenCache::new();
        cache.put("7", "a".to_string(), Utc::now() + Duration::hours(1));
        cache.put("8", "b".to_string(), Utc::now() + Duration::hours(1));

        assert_eq!(cache.latest_installation_id(), Some("8".to_string()));
    }

    #[test]
    fn latest_falls_back_to_any_key() {
        let cache = TokenCache::new();
        cache.put("7", "a".to_string(), Utc::now() + Duration::hours(1));

        // Force the explicit pointer away without touching entries.
        if let Ok(mut state) = cache.state.write() {
            state.latest = None;
        }

        assert_eq!(cache.latest_installation_id(), Some("7".to_string()));
    }

    #[test]
    fn clear_empties_everything() {
        let cache = TokenCache::new();
        cache.put("7", "a".to_string(), Utc::now() + Duration::hours(1));
        cache.record_installation("8");

        cache.clear();

        assert!(!cache.has_any());
        assert!(cache.latest_installation_id().is_none());
        assert!(cache.get("7").is_none());
    }

    #[test]
    fn concurrent_puts_and_gets() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(TokenCache::new());
        let expires = Utc::now() + Duration::hours(1);

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for n in 0..50 {
                        cache.put(&format!("{i}"), format!("tok-{i}-{n}"), expires);
                        let _ = cache.get(&format!("{i}"));
                        let _ = cache.latest_installation_id();
                    }
                })
            })
            .collect();

        for handle in writers {
            handle.join().expect("writer thread");
        }

        assert!(cache.has_any());
        for i in 0..4 {
            assert!(cache.get(&format!("{i}")).is_some());
        }
    }
}
