//! Shared GitHub REST API plumbing.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;

/// Media type GitHub expects on REST calls.
pub(crate) const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

/// Pinned REST API version.
pub(crate) const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
pub(crate) const API_VERSION: &str = "2022-11-28";

/// User-Agent sent on every request (GitHub rejects requests without one).
pub(crate) const CLIENT_USER_AGENT: &str = "octoapp";

/// Request timeout for partner API calls. Exchange and discovery calls are
/// the only network I/O in the crate; a hung partner endpoint must not hang
/// the caller indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the HTTP client shared by the broker and discovery.
pub(crate) fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}

/// Common headers for authenticated GitHub API requests.
pub(crate) fn github_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_GITHUB_JSON));
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_include_accept_and_version() {
        let headers = github_headers();
        assert_eq!(
            headers.get(ACCEPT).and_then(|v| v.to_str().ok()),
            Some("application/vnd.github+json")
        );
        assert_eq!(
            headers.get(API_VERSION_HEADER).and_then(|v| v.to_str().ok()),
            Some("2022-11-28")
        );
        assert_eq!(
            headers.get(USER_AGENT).and_then(|v| v.to_str().ok()),
            Some("octoapp")
        );
    }

    #[test]
    fn client_builds() {
        assert!(http_client().is_ok());
    }
}
