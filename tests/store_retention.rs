//! Retention store semantics: ordered non-destructive reads, TTL
//! eviction, and persistence across reopen.

use std::time::Duration;

use feedrelay::parser::FeedItem;
use feedrelay::store::RetentionStore;

fn item(title: &str, link: &str) -> FeedItem {
    FeedItem {
        title: title.to_string(),
        link: link.to_string(),
        summary: format!("summary of {title}"),
        published_at: String::new(),
        source: "test-feed".to_string(),
    }
}

#[tokio::test]
async fn retrieve_returns_oldest_rows_first_up_to_the_limit() {
    let store = RetentionStore::open_in_memory().await.unwrap();
    let batch = vec![
        item("a", "https://example.com/a"),
        item("b", "https://example.com/b"),
        item("c", "https://example.com/c"),
    ];
    assert_eq!(store.insert(&batch).await.unwrap(), 3);

    let rows = store.retrieve(2).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].title, "a");
    assert_eq!(rows[1].title, "b");
    assert!(rows[0].id < rows[1].id);
}

#[tokio::test]
async fn non_positive_limit_yields_no_rows() {
    let store = RetentionStore::open_in_memory().await.unwrap();
    store.insert(&[item("a", "https://example.com/a")]).await.unwrap();

    assert!(store.retrieve(0).await.unwrap().is_empty());
    assert!(store.retrieve(-1).await.unwrap().is_empty());
}

#[tokio::test]
async fn retrieve_is_non_destructive() {
    let store = RetentionStore::open_in_memory().await.unwrap();
    store.insert(&[item("a", "https://example.com/a")]).await.unwrap();

    assert_eq!(store.retrieve(10).await.unwrap().len(), 1);
    assert_eq!(store.retrieve(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_inserts_are_kept_as_separate_rows() {
    let store = RetentionStore::open_in_memory().await.unwrap();
    let same = item("dup", "https://example.com/dup");
    store.insert(&[same.clone()]).await.unwrap();
    store.insert(&[same]).await.unwrap();

    assert_eq!(store.retrieve(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_insert_is_a_no_op() {
    let store = RetentionStore::open_in_memory().await.unwrap();
    assert_eq!(store.insert(&[]).await.unwrap(), 0);
    assert!(store.retrieve(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn eviction_removes_only_rows_past_the_ttl() {
    let store = RetentionStore::open_in_memory().await.unwrap();
    store.insert(&[item("old", "https://example.com/old")]).await.unwrap();

    // A generous TTL keeps everything.
    assert_eq!(store.evict_expired(Duration::from_secs(3600)).await.unwrap(), 0);

    // Age the row past a zero TTL, then evict.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(store.evict_expired(Duration::from_secs(0)).await.unwrap(), 1);
    assert!(store.retrieve(10).await.unwrap().is_empty());

    // Second pass finds nothing left.
    assert_eq!(store.evict_expired(Duration::from_secs(0)).await.unwrap(), 0);
}

#[tokio::test]
async fn rows_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retention.sqlite3");

    {
        let store = RetentionStore::open(&path).await.unwrap();
        store.insert(&[item("durable", "https://example.com/d")]).await.unwrap();
    }

    let store = RetentionStore::open(&path).await.unwrap();
    let rows = store.retrieve(10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "durable");
    assert_eq!(rows[0].source, "test-feed");
}
