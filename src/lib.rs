// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod rewrite;
pub mod store;
pub mod websub;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{ApiError, ParseError};
pub use crate::parser::FeedItem;
pub use crate::pipeline::{Pipeline, PublisherSet, Rewriter, RunSummary};
pub use crate::retry::{Attempt, Backoff};
pub use crate::store::{RetentionStore, StoredItem};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing from `RUST_LOG` (default `info`) with a compact
/// format. Called once per binary, before any other work.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}
