// src/publish/text.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{classify_failure, TextPoster};
use crate::error::ApiError;
use crate::retry::{with_backoff, Attempt, Backoff};

const DEFAULT_ENDPOINT: &str = "https://api.twitter.com/2/tweets";

/// One publisher per configured bearer token.
pub struct TextPublisher {
    bearer_token: String,
    endpoint: String,
    http: reqwest::Client,
    timeout: Duration,
    backoff: Backoff,
}

impl TextPublisher {
    pub fn new(bearer_token: impl Into<String>) -> Result<Self, ApiError> {
        let bearer_token = bearer_token.into();
        if bearer_token.is_empty() {
            return Err(ApiError::EmptyInput("bearer_token"));
        }
        Ok(Self {
            bearer_token,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(25),
            backoff: Backoff::standard(),
        })
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    async fn attempt(&self, text: &str) -> Attempt<String> {
        let payload = serde_json::json!({ "text": text.trim() });
        let resp = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .json(&payload)
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
            return classify_failure("text", code, &body);
        }

        #[derive(Deserialize)]
        struct Posted {
            data: Option<PostedData>,
        }
        #[derive(Deserialize)]
        struct PostedData {
            id: Option<String>,
        }
        match serde_json::from_str::<Posted>(&body)
            .ok()
            .and_then(|p| p.data)
            .and_then(|d| d.id)
            .filter(|id| !id.is_empty())
        {
            Some(id) => Attempt::Done(id),
            None => Attempt::Retry(ApiError::Protocol("no post id returned".to_string())),
        }
    }
}

#[async_trait]
impl TextPoster for TextPublisher {
    async fn post_text(&self, text: &str) -> Result<String, ApiError> {
        if text.trim().is_empty() {
            return Err(ApiError::EmptyInput("text"));
        }
        with_backoff(self.backoff, "text_post", || self.attempt(text)).await
    }

    fn label(&self) -> String {
        let tail: String = self
            .bearer_token
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("text:****{tail}")
    }
}
