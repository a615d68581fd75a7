//! Rewrite client failure taxonomy, exercised through a scripted
//! transport: credential rotation, 401 eviction, retry vs fatal mapping.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use feedrelay::error::ApiError;
use feedrelay::retry::Backoff;
use feedrelay::rewrite::{ChatRequest, ChatTransport, RewriteClient, WireReply};

/// Plays back a fixed sequence of replies and records every key used.
struct ScriptedTransport {
    replies: Mutex<VecDeque<WireReply>>,
    keys_seen: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<WireReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            keys_seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.keys_seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post_chat(&self, api_key: &str, _payload: &ChatRequest) -> WireReply {
        self.keys_seen.lock().unwrap().push(api_key.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(WireReply::Down("script exhausted".to_string()))
    }
}

fn ok_reply(content: &str) -> WireReply {
    WireReply::Status {
        code: 200,
        body: format!(r#"{{"choices":[{{"message":{{"content":"{content}"}}}}]}}"#),
    }
}

fn status(code: u16) -> WireReply {
    WireReply::Status {
        code,
        body: String::new(),
    }
}

fn fast() -> Backoff {
    Backoff {
        attempts: 5,
        initial: Duration::from_millis(1),
        ceiling: Duration::from_millis(4),
    }
}

fn client(transport: Arc<ScriptedTransport>, keys: Vec<&str>) -> RewriteClient {
    RewriteClient::with_transport(
        transport,
        keys.into_iter().map(String::from).collect(),
        "test-model",
    )
    .unwrap()
    .with_backoff(fast())
}

#[tokio::test]
async fn successful_rewrite_returns_trimmed_content() {
    let transport = ScriptedTransport::new(vec![ok_reply("  A fresh take  ")]);
    let c = client(transport.clone(), vec!["k1"]);

    let out = c.rewrite("original text", None).await.unwrap();
    assert_eq!(out, "A fresh take");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn empty_input_never_reaches_the_wire() {
    let transport = ScriptedTransport::new(vec![ok_reply("unused")]);
    let c = client(transport.clone(), vec!["k1"]);

    let err = c.rewrite("   ", None).await.unwrap_err();
    assert!(matches!(err, ApiError::EmptyInput("article_text")));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn repeated_unauthorized_drains_the_pool() {
    let transport = ScriptedTransport::new(vec![status(401), status(401), status(401)]);
    let c = client(transport.clone(), vec!["k1", "k2", "k3"]);

    let err = c.rewrite("text", None).await.unwrap_err();
    assert!(matches!(err, ApiError::PoolExhausted));
    assert_eq!(transport.calls(), 3);
    assert_eq!(c.remaining_credentials(), 0);

    // Each attempt used a credential that was then evicted, so every key
    // on the wire is distinct.
    let seen = transport.keys_seen.lock().unwrap().clone();
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seen.len());

    // With the pool empty, later calls fail before any wire exchange.
    let err = c.rewrite("more text", None).await.unwrap_err();
    assert!(matches!(err, ApiError::PoolExhausted));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let transport =
        ScriptedTransport::new(vec![status(500), status(503), ok_reply("eventually")]);
    let c = client(transport.clone(), vec!["k1"]);

    let out = c.rewrite("text", None).await.unwrap();
    assert_eq!(out, "eventually");
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn transport_outage_is_retried() {
    let transport = ScriptedTransport::new(vec![
        WireReply::Down("connection refused".to_string()),
        ok_reply("recovered"),
    ]);
    let c = client(transport.clone(), vec!["k1"]);

    assert_eq!(c.rewrite("text", None).await.unwrap(), "recovered");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn client_error_fails_without_retrying() {
    let transport = ScriptedTransport::new(vec![status(404), ok_reply("unreached")]);
    let c = client(transport.clone(), vec!["k1"]);

    let err = c.rewrite("text", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Client(404)));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn empty_completions_exhaust_the_retry_budget() {
    let transport = ScriptedTransport::new(vec![
        ok_reply(""),
        ok_reply(""),
        ok_reply(""),
        ok_reply(""),
        ok_reply(""),
    ]);
    let c = client(transport.clone(), vec!["k1"]);

    let err = c.rewrite("text", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Protocol(_)));
    assert_eq!(transport.calls(), 5);
}
