// src/pipeline.rs
//! Pipeline orchestrator: Cleanup → Ingest → (per item) Rewrite →
//! PublishToEachPlatform → Delay. Strictly sequential; one item is fully
//! published before the next begins. Per-item and per-account failures are
//! caught and logged here and never abort the batch; store and
//! configuration failures propagate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::fetch;
use crate::parser::FeedItem;
use crate::publish::{PhotoPoster, PhotoPublisher, TextPoster, TextPublisher};
use crate::rewrite::RewriteClient;
use crate::store::RetentionStore;

/// Seam for the rewrite step so the orchestrator can be exercised with a
/// canned rewriter in tests.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str, tone_hint: Option<&str>) -> Result<String, ApiError>;
}

#[async_trait]
impl Rewriter for RewriteClient {
    async fn rewrite(&self, text: &str, tone_hint: Option<&str>) -> Result<String, ApiError> {
        RewriteClient::rewrite(self, text, tone_hint).await
    }
}

/// Every configured platform/account pair, in declared order: photo
/// accounts first, then text accounts.
#[derive(Default)]
pub struct PublisherSet {
    pub photo: Vec<Arc<dyn PhotoPoster>>,
    pub text: Vec<Arc<dyn TextPoster>>,
}

impl PublisherSet {
    pub fn is_empty(&self) -> bool {
        self.photo.is_empty() && self.text.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Items inserted into the store this run.
    pub ingested: u64,
    /// Items successfully rewritten.
    pub rewritten: usize,
    /// Successful platform/account posts.
    pub posted: usize,
    /// Items skipped because the rewrite failed.
    pub skipped: usize,
}

pub struct Pipeline {
    store: Arc<RetentionStore>,
    rewriter: Arc<dyn Rewriter>,
    publishers: PublisherSet,
    tone_hint: Option<String>,
    delay: Duration,
    ttl: Duration,
    batch_limit: i64,
}

impl Pipeline {
    pub fn new(
        store: Arc<RetentionStore>,
        rewriter: Arc<dyn Rewriter>,
        publishers: PublisherSet,
    ) -> Self {
        Self {
            store,
            rewriter,
            publishers,
            tone_hint: None,
            delay: Duration::from_secs(15),
            ttl: Duration::from_secs(86_400),
            batch_limit: 50,
        }
    }

    pub fn with_tone_hint(mut self, tone_hint: Option<String>) -> Self {
        self.tone_hint = tone_hint;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_batch_limit(mut self, limit: i64) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn store(&self) -> &RetentionStore {
        &self.store
    }

    /// Pull mode: evict expired rows, fetch every configured feed, insert,
    /// then process the retrieved batch.
    pub async fn run_poll(
        &self,
        http: &reqwest::Client,
        feeds: &[String],
    ) -> anyhow::Result<RunSummary> {
        let removed = self.store.evict_expired(self.ttl).await?;
        if removed > 0 {
            tracing::info!(removed, "evicted expired items");
        }

        let items = fetch::fetch_feeds(http, feeds).await;
        let inserted = self.store.insert(&items).await?;
        tracing::info!(fetched = items.len(), "fetched and stored items");

        let batch: Vec<FeedItem> = self
            .store
            .retrieve(self.batch_limit)
            .await?
            .into_iter()
            .map(FeedItem::from)
            .collect();

        let mut summary = self.process_items(&batch).await;
        summary.ingested = inserted;
        Ok(summary)
    }

    /// Push mode: parse one notification body, insert its items, and
    /// process them directly (no external fetch). A parse failure is fatal
    /// for this notification only.
    pub async fn run_push(&self, body: &[u8]) -> anyhow::Result<RunSummary> {
        let removed = self.store.evict_expired(self.ttl).await?;
        if removed > 0 {
            tracing::info!(removed, "evicted expired items");
        }

        let items = crate::parser::parse_feed(body, "")?;
        if items.is_empty() {
            tracing::info!("no items found in notification");
            return Ok(RunSummary::default());
        }
        let inserted = self.store.insert(&items).await?;
        tracing::info!(inserted, "stored notification items");

        let mut summary = self.process_items(&items).await;
        summary.ingested = inserted;
        Ok(summary)
    }

    /// Rewrite and publish each item in order, sleeping the configured
    /// delay after every item. A failed rewrite skips only that item.
    pub async fn process_items(&self, items: &[FeedItem]) -> RunSummary {
        fetch::ensure_metrics_described();
        if !items.is_empty() && self.publishers.is_empty() {
            tracing::warn!("no platforms configured");
        }

        let mut summary = RunSummary::default();
        for item in items {
            let source_text = compose_source_text(item);
            match self
                .rewriter
                .rewrite(&source_text, self.tone_hint.as_deref())
                .await
            {
                Ok(rewritten) => {
                    summary.rewritten += 1;
                    tracing::info!(title = %item.title, "rewrote item");
                    summary.posted += self.publish_item(item, &rewritten).await;
                }
                Err(e) => {
                    summary.skipped += 1;
                    counter!("relay_rewrite_failures_total").increment(1);
                    tracing::error!(
                        error = %e,
                        title = %item.title,
                        source = %item.source,
                        "rewrite failed; skipping item"
                    );
                }
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        summary
    }

    async fn publish_item(&self, item: &FeedItem, rewritten: &str) -> usize {
        let mut posted = 0;

        if !self.publishers.photo.is_empty() {
            match image_url_for(&item.link) {
                Some(image_url) => {
                    for publisher in &self.publishers.photo {
                        match publisher.post_photo(image_url, rewritten).await {
                            Ok(id) => {
                                posted += 1;
                                counter!("relay_posts_total").increment(1);
                                tracing::info!(account = %publisher.label(), post_id = %id, "published photo post");
                            }
                            Err(e) => {
                                counter!("relay_post_failures_total").increment(1);
                                tracing::error!(account = %publisher.label(), error = %e, "photo post failed");
                            }
                        }
                    }
                }
                None => {
                    tracing::warn!(link = %item.link, "no direct image url; skipping photo platform");
                }
            }
        }

        if !self.publishers.text.is_empty() && !rewritten.trim().is_empty() {
            let body = text_post_body(rewritten, &item.link);
            for publisher in &self.publishers.text {
                match publisher.post_text(&body).await {
                    Ok(id) => {
                        posted += 1;
                        counter!("relay_posts_total").increment(1);
                        tracing::info!(account = %publisher.label(), post_id = %id, "published text post");
                    }
                    Err(e) => {
                        counter!("relay_post_failures_total").increment(1);
                        tracing::error!(account = %publisher.label(), error = %e, "text post failed");
                    }
                }
            }
        }

        posted
    }
}

/// The text handed to the rewriter: title, summary, and a read-more line.
pub fn compose_source_text(item: &FeedItem) -> String {
    format!(
        "{}\n\n{}\n\nRead more: {}",
        item.title, item.summary, item.link
    )
}

/// The photo platform needs a direct image URL; only the item's own link
/// qualifies, and only with an image file extension.
pub fn image_url_for(link: &str) -> Option<&str> {
    const IMAGE_EXTS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];
    let lower = link.to_ascii_lowercase();
    IMAGE_EXTS
        .iter()
        .any(|ext| lower.ends_with(ext))
        .then_some(link)
}

/// Text-platform body: the rewritten post with the canonical link appended
/// when present.
pub fn text_post_body(rewritten: &str, link: &str) -> String {
    if link.is_empty() {
        rewritten.to_string()
    } else {
        format!("{rewritten}\n\n{link}")
    }
}

/// Build one publisher per configured account from the environment config.
/// A photo id/token length mismatch disables the photo platform with a
/// warning, matching the per-account pairing contract.
pub fn build_publishers(cfg: &AppConfig) -> anyhow::Result<PublisherSet> {
    let mut set = PublisherSet::default();

    if cfg.platforms.iter().any(|p| p == "photo") {
        if cfg.photo_account_ids.len() != cfg.photo_account_tokens.len() {
            tracing::warn!(
                ids = cfg.photo_account_ids.len(),
                tokens = cfg.photo_account_tokens.len(),
                "photo account ids and tokens length mismatch; skipping photo platform"
            );
        } else {
            for (id, token) in cfg.photo_account_ids.iter().zip(&cfg.photo_account_tokens) {
                set.photo.push(Arc::new(PhotoPublisher::new(id, token)?));
            }
        }
    }

    if cfg.platforms.iter().any(|p| p == "text") {
        for token in &cfg.text_bearer_tokens {
            set.text.push(Arc::new(TextPublisher::new(token)?));
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_eligibility_by_extension() {
        assert_eq!(
            image_url_for("https://x/img.png"),
            Some("https://x/img.png")
        );
        assert_eq!(
            image_url_for("https://x/IMG.JPEG"),
            Some("https://x/IMG.JPEG")
        );
        assert_eq!(image_url_for("https://x/page.html"), None);
        assert_eq!(image_url_for("https://x/img.png?s=1"), None);
        assert_eq!(image_url_for(""), None);
    }

    #[test]
    fn source_text_layout() {
        let item = FeedItem {
            title: "T".into(),
            link: "https://x/a".into(),
            summary: "S".into(),
            ..Default::default()
        };
        assert_eq!(
            compose_source_text(&item),
            "T\n\nS\n\nRead more: https://x/a"
        );
    }

    #[test]
    fn text_body_appends_link_only_when_present() {
        assert_eq!(text_post_body("R", "https://x/a"), "R\n\nhttps://x/a");
        assert_eq!(text_post_body("R", ""), "R");
    }
}
