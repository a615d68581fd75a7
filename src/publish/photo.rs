// src/publish/photo.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{classify_failure, PhotoPoster};
use crate::error::ApiError;
use crate::retry::{with_backoff, Attempt, Backoff};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";

/// One publisher per configured account. Posts a photo by URL with a
/// caption via the form-encoded per-account endpoint.
pub struct PhotoPublisher {
    account_id: String,
    access_token: String,
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
    backoff: Backoff,
}

impl PhotoPublisher {
    pub fn new(
        account_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let account_id = account_id.into();
        let access_token = access_token.into();
        if account_id.is_empty() {
            return Err(ApiError::EmptyInput("account_id"));
        }
        if access_token.is_empty() {
            return Err(ApiError::EmptyInput("access_token"));
        }
        Ok(Self {
            account_id,
            access_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(25),
            backoff: Backoff::standard(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn attempt(&self, image_url: &str, caption: &str) -> Attempt<String> {
        let url = format!(
            "{}/{}/photos",
            self.base_url.trim_end_matches('/'),
            self.account_id
        );
        let form = [
            ("url", image_url),
            ("caption", caption),
            ("access_token", self.access_token.as_str()),
        ];
        let resp = match self
            .http
            .post(&url)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(ApiError::Transport(e.to_string())),
        };
        let code = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        if !(200..300).contains(&code) {
            return classify_failure("photo", code, &body);
        }

        #[derive(Deserialize)]
        struct Posted {
            id: Option<String>,
        }
        match serde_json::from_str::<Posted>(&body)
            .ok()
            .and_then(|p| p.id)
            .filter(|id| !id.is_empty())
        {
            Some(id) => Attempt::Done(id),
            None => Attempt::Retry(ApiError::Protocol("no post id returned".to_string())),
        }
    }
}

#[async_trait]
impl PhotoPoster for PhotoPublisher {
    async fn post_photo(&self, image_url: &str, caption: &str) -> Result<String, ApiError> {
        if image_url.is_empty() {
            return Err(ApiError::EmptyInput("image_url"));
        }
        with_backoff(self.backoff, "photo_post", || {
            self.attempt(image_url, caption)
        })
        .await
    }

    fn label(&self) -> String {
        format!("photo:{}", self.account_id)
    }
}
