// src/api.rs
//! Webhook surface for push mode: the hub's verification callback and the
//! content notification endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::error::ParseError;
use crate::pipeline::Pipeline;
use crate::websub::SecretStore;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub secrets: Arc<SecretStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_subscription).post(receive_notification))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

#[derive(Debug, serde::Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.topic")]
    topic: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.lease_seconds")]
    lease_seconds: Option<String>,
    #[serde(rename = "hub.secret")]
    secret: Option<String>,
}

/// Subscription verification: echo the challenge verbatim and remember the
/// per-topic secret for later signature checks.
async fn verify_subscription(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> String {
    if params.mode.as_deref() == Some("subscribe") {
        if let Some(challenge) = params.challenge {
            let topic = params.topic.unwrap_or_default();
            tracing::info!(topic = %topic, lease = ?params.lease_seconds, "hub verification");
            if let Some(secret) = params.secret {
                state.secrets.remember(&topic, &secret);
                tracing::info!(topic = %topic, "stored secret for topic");
            }
            return challenge;
        }
    }
    "OK".to_string()
}

/// Content notification: verify the signature when one is presented and
/// secrets are known, then ingest and process the body.
async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let signature = headers
        .get("x-hub-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    tracing::info!(bytes = body.len(), "hub notification");

    if !signature.is_empty()
        && !state.secrets.is_empty()
        && !state.secrets.verify_any(&body, signature)
    {
        tracing::warn!("notification signature verification failed");
        return (
            StatusCode::BAD_REQUEST,
            "Signature verification failed".to_string(),
        );
    }

    match state.pipeline.run_push(&body).await {
        Ok(summary) if summary.ingested == 0 => (StatusCode::OK, "No items".to_string()),
        Ok(summary) => {
            tracing::info!(
                ingested = summary.ingested,
                rewritten = summary.rewritten,
                posted = summary.posted,
                "processed notification"
            );
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) if e.downcast_ref::<ParseError>().is_some() => {
            tracing::warn!(error = %e, "notification parse failed");
            (StatusCode::BAD_REQUEST, "XML parsing failed".to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "notification processing error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Processing error".to_string(),
            )
        }
    }
}
