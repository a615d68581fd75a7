// src/websub.rs
//! WebSub plumbing: the outbound hub client (subscribe/unsubscribe under
//! HTTP Basic auth) and inbound notification signature verification, plus
//! the per-topic secret store handed to the webhook handler.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ApiError;
use crate::retry::{snippet, with_backoff, Attempt, Backoff};

type HmacSha256 = Hmac<Sha256>;

/// Verify an `x-hub-signature: sha256=<hex>` header against the raw body.
/// Comparison is constant-time (`Mac::verify_slice`).
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }
    let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac takes any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Topic → secret map populated by the verification callback and read on
/// notifications. Entries are never expired: growth is bounded only by the
/// number of distinct topics.
/// TODO: expire entries when the hub lease ends.
#[derive(Debug, Default)]
pub struct SecretStore {
    inner: Mutex<HashMap<String, String>>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&self, topic: &str, secret: &str) {
        let mut map = self.inner.lock().expect("secret store mutex poisoned");
        map.insert(topic.to_string(), secret.to_string());
    }

    pub fn get(&self, topic: &str) -> Option<String> {
        let map = self.inner.lock().expect("secret store mutex poisoned");
        map.get(topic).cloned()
    }

    pub fn is_empty(&self) -> bool {
        let map = self.inner.lock().expect("secret store mutex poisoned");
        map.is_empty()
    }

    /// True when any stored secret verifies the signature. Notifications
    /// do not name their topic, so every known secret is tried.
    pub fn verify_any(&self, body: &[u8], signature: &str) -> bool {
        let map = self.inner.lock().expect("secret store mutex poisoned");
        map.values().any(|s| verify_signature(s, body, signature))
    }
}

/// Subscription client for the push hub.
pub struct HubClient {
    http: reqwest::Client,
    hub_url: String,
    user: String,
    password: String,
    timeout: Duration,
    backoff: Backoff,
}

impl HubClient {
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        hub_url: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let user = user.into();
        let password = password.into();
        if user.is_empty() {
            return Err(ApiError::EmptyInput("hub user"));
        }
        if password.is_empty() {
            return Err(ApiError::EmptyInput("hub password"));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            hub_url: hub_url.into().trim_end_matches('/').to_string(),
            user,
            password,
            timeout: Duration::from_secs(30),
            backoff: Backoff::standard(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn subscribe(
        &self,
        feed_url: &str,
        callback_url: &str,
        secret: Option<&str>,
        lease_seconds: u64,
    ) -> Result<(), ApiError> {
        if feed_url.is_empty() || callback_url.is_empty() {
            return Err(ApiError::EmptyInput("feed_url and callback_url"));
        }
        with_backoff(self.backoff, "hub_subscribe", || {
            self.send_mode("subscribe", feed_url, callback_url, secret, Some(lease_seconds))
        })
        .await
    }

    pub async fn unsubscribe(&self, feed_url: &str, callback_url: &str) -> Result<(), ApiError> {
        if feed_url.is_empty() || callback_url.is_empty() {
            return Err(ApiError::EmptyInput("feed_url and callback_url"));
        }
        with_backoff(self.backoff, "hub_unsubscribe", || {
            self.send_mode("unsubscribe", feed_url, callback_url, None, None)
        })
        .await
    }

    async fn send_mode(
        &self,
        mode: &str,
        topic: &str,
        callback: &str,
        secret: Option<&str>,
        lease_seconds: Option<u64>,
    ) -> Attempt<()> {
        let mut form: Vec<(&str, String)> = vec![
            ("hub.mode", mode.to_string()),
            ("hub.topic", topic.to_string()),
            ("hub.callback", callback.to_string()),
        ];
        if mode == "subscribe" {
            form.push(("hub.verify", "async".to_string()));
            if let Some(lease) = lease_seconds {
                form.push(("hub.lease_seconds", lease.to_string()));
            }
            if let Some(secret) = secret {
                form.push(("hub.secret", secret.to_string()));
            }
        }

        let resp = match self
            .http
            .post(&self.hub_url)
            .basic_auth(&self.user, Some(&self.password))
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(ApiError::Transport(e.to_string())),
        };

        let code = resp.status().as_u16();
        match code {
            // 204 confirmed, 202 accepted pending async verification
            202 | 204 => {
                tracing::info!(topic, mode, status = code, "hub accepted request");
                Attempt::Done(())
            }
            400 => {
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(topic, body = %snippet(&body), "hub rejected request");
                Attempt::Fatal(ApiError::Client(400))
            }
            401 => Attempt::Fatal(ApiError::Client(401)),
            c if c >= 500 => Attempt::Retry(ApiError::Server(c)),
            c => Attempt::Retry(ApiError::Protocol(format!("unexpected hub status {c}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;

    fn digest_hex(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn known_vector_verifies_and_one_flipped_char_fails() {
        let sig = format!("sha256={}", digest_hex("s3cr3t", b"hello"));
        assert!(verify_signature("s3cr3t", b"hello", &sig));

        let mut flipped: Vec<char> = sig.chars().collect();
        let last = *flipped.last().unwrap();
        *flipped.last_mut().unwrap() = if last == '0' { '1' } else { '0' };
        let flipped: String = flipped.into_iter().collect();
        assert!(!verify_signature("s3cr3t", b"hello", &flipped));
    }

    #[test]
    fn prefix_is_optional_and_garbage_is_rejected() {
        let bare = digest_hex("s3cr3t", b"hello");
        assert!(verify_signature("s3cr3t", b"hello", &bare));
        assert!(!verify_signature("s3cr3t", b"hello", "sha256=zz-not-hex"));
        assert!(!verify_signature("", b"hello", &bare));
        assert!(!verify_signature("s3cr3t", b"hello", ""));
    }

    #[test]
    fn secret_store_tries_every_topic() {
        let store = SecretStore::new();
        assert!(store.is_empty());
        store.remember("https://a.example/feed", "wrong");
        store.remember("https://b.example/feed", "s3cr3t");
        let sig = format!("sha256={}", digest_hex("s3cr3t", b"payload"));
        assert!(store.verify_any(b"payload", &sig));
        assert!(!store.verify_any(b"tampered", &sig));
        assert_eq!(
            store.get("https://b.example/feed").as_deref(),
            Some("s3cr3t")
        );
    }
}
