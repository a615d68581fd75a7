//! WebSub subscription manager: subscribes every configured feed to the
//! push hub with a fresh per-feed secret. Exits non-zero when any
//! subscription fails.

use std::process::ExitCode;

use anyhow::bail;
use rand::Rng;
use tracing::{error, info};

use feedrelay::config::AppConfig;
use feedrelay::init_tracing;
use feedrelay::websub::HubClient;

const LEASE_SECONDS: u64 = 86_400;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "subscription run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    cfg.require_hub()?;
    if cfg.feeds.is_empty() {
        bail!("FEEDS is empty; nothing to subscribe");
    }

    info!(feeds = cfg.feeds.len(), callback = %cfg.callback_url, "subscribing feeds");
    let hub = HubClient::new(&cfg.hub_user, &cfg.hub_password, &cfg.hub_url)?;

    let mut subscribed = 0usize;
    let mut failed = 0usize;
    for feed in &cfg.feeds {
        let secret = fresh_secret();
        match hub
            .subscribe(feed, &cfg.callback_url, Some(&secret), LEASE_SECONDS)
            .await
        {
            Ok(()) => {
                subscribed += 1;
                info!(feed = %feed, "subscribed");
            }
            Err(e) => {
                failed += 1;
                error!(feed = %feed, error = %e, "subscription failed");
            }
        }
    }

    info!(subscribed, failed, "subscription pass complete");
    if failed > 0 {
        bail!("{failed} subscription(s) failed");
    }
    Ok(())
}

fn fresh_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
