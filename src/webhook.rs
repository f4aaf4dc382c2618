//! Webhook signature verification.
//!
//! GitHub signs every webhook delivery with HMAC-SHA256 over the raw
//! request body and sends the result in `X-Hub-Signature-256` as
//! `sha256=<hex>`. Verification recomputes the tag with the shared secret
//! and compares.
//!
//! The hash must cover the exact raw bytes GitHub sent. Re-serializing a
//! parsed payload changes the bytes and breaks the signature, so
//! verification runs before any parsing.
//!
//! Verification is total: malformed headers, wrong prefixes and non-hex
//! suffixes all yield `false`, never an error.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

/// Required prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies webhook payloads against the shared webhook secret.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.webhook_secret().clone())
    }

    /// Verify a delivery.
    ///
    /// `payload` must be the raw, unparsed request body;
    /// `signature_header` is the full `X-Hub-Signature-256` value. The hex
    /// comparison is case-insensitive and constant-time.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> bool {
        let Some(provided) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
            warn!("webhook signature header missing '{}' prefix", SIGNATURE_PREFIX);
            return false;
        };

        let mut mac = match HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload);
        let computed = hex::encode(mac.finalize().into_bytes());

        let provided = provided.to_ascii_lowercase();
        let valid: bool = computed.as_bytes().ct_eq(provided.as_bytes()).into();
        if !valid {
            warn!("webhook signature verification failed");
        }
        valid
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookVerifier(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(secret: &str) -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from(secret.to_string()))
    }

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
        mac.update(payload);
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"action":"completed"}"#;
        let header = sign("topsecret", body);

        assert!(verifier("topsecret").verify(body, &header));
    }

    #[test]
    fn uppercase_hex_verifies() {
        let body = b"payload";
        let header = sign("topsecret", body).to_uppercase();
        // prefix must stay lowercase; only the hex is case-insensitive
        let header = header.replacen("SHA256=", "sha256=", 1);

        assert!(verifier("topsecret").verify(body, &header));
    }

    #[test]
    fn flipped_payload_byte_fails() {
        let body = b"payload";
        let header = sign("topsecret", body);

        assert!(!verifier("topsecret").verify(b"paYload", &header));
    }

    #[test]
    fn flipped_signature_char_fails() {
        let body = b"payload";
        let mut header = sign("topsecret", body);
        // flip the last hex digit
        let last = header.pop().expect("nonempty");
        header.push(if last == '0' { '1' } else { '0' });

        assert!(!verifier("topsecret").verify(body, &header));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let header = sign("topsecret", body);

        assert!(!verifier("othersecret").verify(body, &header));
    }

    #[test]
    fn missing_prefix_is_false_not_error() {
        let body = b"payload";
        let header = sign("topsecret", body);
        let bare = header.strip_prefix(SIGNATURE_PREFIX).expect("prefix");

        assert!(!verifier("topsecret").verify(body, bare));
        assert!(!verifier("topsecret").verify(body, ""));
        assert!(!verifier("topsecret").verify(body, "sha1=abcdef"));
    }

    #[test]
    fn non_hex_suffix_is_false_not_error() {
        assert!(!verifier("topsecret").verify(b"payload", "sha256=zzzz-not-hex"));
        assert!(!verifier("topsecret").verify(b"payload", "sha256="));
    }

    #[test]
    fn empty_body_still_signs_and_verifies() {
        let header = sign("topsecret", b"");
        assert!(verifier("topsecret").verify(b"", &header));
    }
}
