//! Push-mode webhook server. Boots the Axum receiver, wiring the retention
//! store, rewrite client, and publisher set into the pipeline.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use feedrelay::config::AppConfig;
use feedrelay::pipeline::{self, Pipeline};
use feedrelay::rewrite::RewriteClient;
use feedrelay::store::RetentionStore;
use feedrelay::websub::SecretStore;
use feedrelay::{api, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    cfg.require_rewrite()?;

    let store = Arc::new(
        RetentionStore::open(Path::new(&cfg.database_path))
            .await
            .context("opening item store")?,
    );

    // Bound store growth before accepting any notification.
    let removed = store
        .evict_expired(Duration::from_secs(cfg.storage_ttl_seconds))
        .await?;
    if removed > 0 {
        info!(removed, "cleaned up expired items");
    }

    let rewriter = Arc::new(RewriteClient::new(
        &cfg.rewrite_base_url,
        cfg.rewrite_api_keys.clone(),
        cfg.rewrite_model.clone(),
    )?);
    let publishers = pipeline::build_publishers(&cfg)?;

    let pipeline = Arc::new(
        Pipeline::new(store, rewriter, publishers)
            .with_tone_hint(cfg.tone_hint.clone())
            .with_delay(Duration::from_secs(cfg.process_delay_seconds))
            .with_ttl(Duration::from_secs(cfg.storage_ttl_seconds))
            .with_batch_limit(cfg.batch_limit),
    );

    let state = api::AppState {
        pipeline,
        secrets: Arc::new(SecretStore::new()),
    };
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.webhook_port));
    info!(%addr, callback = %cfg.callback_url, "webhook server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
