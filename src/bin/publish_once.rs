//! Pull-mode single run: evict expired rows, fetch configured feeds,
//! rewrite, and publish the retrieved batch. Exits non-zero when
//! initialization fails; per-item failures are reported via logs only.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use feedrelay::config::AppConfig;
use feedrelay::init_tracing;
use feedrelay::pipeline::{self, Pipeline, RunSummary};
use feedrelay::rewrite::RewriteClient;
use feedrelay::store::RetentionStore;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(summary) => {
            info!(
                ingested = summary.ingested,
                rewritten = summary.rewritten,
                posted = summary.posted,
                skipped = summary.skipped,
                "publish run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "publish run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<RunSummary> {
    info!("starting single-run publish pipeline");
    let cfg = AppConfig::from_env()?;
    cfg.require_rewrite()?;

    let store = Arc::new(
        RetentionStore::open(Path::new(&cfg.database_path))
            .await
            .context("opening item store")?,
    );
    let rewriter = Arc::new(RewriteClient::new(
        &cfg.rewrite_base_url,
        cfg.rewrite_api_keys.clone(),
        cfg.rewrite_model.clone(),
    )?);
    let publishers = pipeline::build_publishers(&cfg)?;

    let pipeline = Pipeline::new(store, rewriter, publishers)
        .with_tone_hint(cfg.tone_hint.clone())
        .with_delay(Duration::from_secs(cfg.process_delay_seconds))
        .with_ttl(Duration::from_secs(cfg.storage_ttl_seconds))
        .with_batch_limit(cfg.batch_limit);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .context("building feed http client")?;

    pipeline.run_poll(&http, &cfg.feeds).await
}
