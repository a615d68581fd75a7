// src/fetch.rs
//! Pull-mode feed retrieval. A feed that fails to fetch or parse is
//! logged and skipped; it never aborts the batch.

use metrics::counter;

use crate::parser::{self, FeedItem};

/// One-time metrics registration.
pub(crate) fn ensure_metrics_described() {
    static ONCE: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();
    ONCE.get_or_init(|| {
        metrics::describe_counter!("relay_feed_items_total", "Valid items parsed from feeds.");
        metrics::describe_counter!("relay_feed_errors_total", "Feed fetch/parse failures.");
        metrics::describe_counter!("relay_rewrite_failures_total", "Items skipped on rewrite failure.");
        metrics::describe_counter!("relay_posts_total", "Successful platform posts.");
        metrics::describe_counter!("relay_post_failures_total", "Failed platform/account attempts.");
    });
}

/// GET every configured feed URL and parse the bodies into canonical
/// items, stamped with the feed URL as source.
pub async fn fetch_feeds(client: &reqwest::Client, feed_urls: &[String]) -> Vec<FeedItem> {
    ensure_metrics_described();

    let mut all = Vec::new();
    for url in feed_urls {
        let resp = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "feed fetch error");
                counter!("relay_feed_errors_total").increment(1);
                continue;
            }
        };
        if resp.status() != reqwest::StatusCode::OK {
            tracing::warn!(feed = %url, status = %resp.status(), "feed returned non-200");
            counter!("relay_feed_errors_total").increment(1);
            continue;
        }
        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "feed body read error");
                counter!("relay_feed_errors_total").increment(1);
                continue;
            }
        };
        match parser::parse_feed(&body, url) {
            Ok(mut items) => {
                counter!("relay_feed_items_total").increment(items.len() as u64);
                all.append(&mut items);
            }
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "feed parse failed");
                counter!("relay_feed_errors_total").increment(1);
            }
        }
    }
    all
}
