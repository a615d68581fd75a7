// src/rewrite.rs
//! Rewrite client: sends item text to the chat-completions rewriting
//! endpoint using a rotating pool of bearer credentials.
//!
//! The wire exchange sits behind [`ChatTransport`] so the pool and the
//! failure taxonomy can be exercised without a network (same split as the
//! provider/client layering in the AI adapter this is modeled on).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::retry::{snippet, with_backoff, Attempt, Backoff};

/// Ordered set of equivalent secret tokens. Selection is uniform-random
/// per call; a token confirmed unauthorized is removed for the remainder
/// of the process. Mutation is serialized behind the mutex so concurrent
/// rewrites cannot corrupt the pool or double-count exhaustion.
pub struct CredentialPool {
    keys: Mutex<Vec<String>>,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Result<Self, ApiError> {
        if keys.is_empty() {
            return Err(ApiError::EmptyInput("credential list"));
        }
        Ok(Self {
            keys: Mutex::new(keys),
        })
    }

    pub fn pick(&self) -> Option<String> {
        let keys = self.keys.lock().expect("credential pool mutex poisoned");
        keys.choose(&mut rand::thread_rng()).cloned()
    }

    /// Remove a rejected credential; returns how many remain.
    pub fn discard(&self, key: &str) -> usize {
        let mut keys = self.keys.lock().expect("credential pool mutex poisoned");
        keys.retain(|k| k != key);
        keys.len()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().expect("credential pool mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// What came back from one wire exchange, before taxonomy mapping.
#[derive(Debug)]
pub enum WireReply {
    Status { code: u16, body: String },
    Down(String),
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat(&self, api_key: &str, payload: &ChatRequest) -> WireReply;
}

pub struct HttpChatTransport {
    http: reqwest::Client,
    url: String,
}

impl HttpChatTransport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(25))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn post_chat(&self, api_key: &str, payload: &ChatRequest) -> WireReply {
        match self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(resp) => {
                let code = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                WireReply::Status { code, body }
            }
            Err(e) => WireReply::Down(e.to_string()),
        }
    }
}

pub struct RewriteClient {
    transport: Arc<dyn ChatTransport>,
    pool: CredentialPool,
    model: String,
    max_tokens: u32,
    backoff: Backoff,
}

impl RewriteClient {
    pub fn new(
        base_url: &str,
        api_keys: Vec<String>,
        model: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Self::with_transport(Arc::new(HttpChatTransport::new(base_url)?), api_keys, model)
    }

    pub fn with_transport(
        transport: Arc<dyn ChatTransport>,
        api_keys: Vec<String>,
        model: impl Into<String>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            transport,
            pool: CredentialPool::new(api_keys)?,
            model: model.into(),
            max_tokens: 220,
            backoff: Backoff::standard(),
        })
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn remaining_credentials(&self) -> usize {
        self.pool.len()
    }

    /// Rewrite `article_text` into a social post. Empty input fails before
    /// any network call; the final retry failure is returned untouched.
    pub async fn rewrite(
        &self,
        article_text: &str,
        tone_hint: Option<&str>,
    ) -> Result<String, ApiError> {
        if article_text.trim().is_empty() {
            return Err(ApiError::EmptyInput("article_text"));
        }
        let prompt = build_prompt(article_text, tone_hint);
        with_backoff(self.backoff, "rewrite", || self.attempt(&prompt)).await
    }

    async fn attempt(&self, prompt: &str) -> Attempt<String> {
        // Fresh random credential on every attempt, not sticky across retries.
        let Some(key) = self.pool.pick() else {
            return Attempt::Fatal(ApiError::PoolExhausted);
        };
        let payload = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
        };

        match self.transport.post_chat(&key, &payload).await {
            WireReply::Down(e) => Attempt::Retry(ApiError::Transport(e)),
            WireReply::Status { code: 401, .. } => {
                let remaining = self.pool.discard(&key);
                tracing::warn!(remaining, "rewrite credential rejected; removed from pool");
                if remaining == 0 {
                    Attempt::Fatal(ApiError::PoolExhausted)
                } else {
                    Attempt::Retry(ApiError::Unauthorized)
                }
            }
            WireReply::Status { code, body } if (200..300).contains(&code) => {
                match extract_content(&body) {
                    Some(text) if !text.is_empty() => Attempt::Done(text),
                    _ => Attempt::Retry(ApiError::Protocol("empty completion".to_string())),
                }
            }
            WireReply::Status { code, .. } if code >= 500 => Attempt::Retry(ApiError::Server(code)),
            WireReply::Status { code, body } => {
                tracing::error!(status = code, body = %snippet(&body), "rewrite endpoint client error");
                Attempt::Fatal(ApiError::Client(code))
            }
        }
    }
}

fn build_prompt(article_text: &str, tone_hint: Option<&str>) -> String {
    let mut prompt = format!(
        "Rewrite the following news article into a concise, engaging social media post. \
         Include emojis only if appropriate. Keep URLs intact.\n\n{}",
        article_text.trim()
    );
    if let Some(tone) = tone_hint {
        prompt = format!("Tone hint: {tone}\n\n{prompt}");
    }
    prompt
}

fn extract_content(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Resp {
        choices: Vec<Choice>,
    }
    #[derive(Deserialize)]
    struct Choice {
        message: ChoiceMsg,
    }
    #[derive(Deserialize)]
    struct ChoiceMsg {
        content: String,
    }

    let resp: Resp = serde_json::from_str(body).ok()?;
    Some(resp.choices.first()?.message.content.trim().to_string())
}
