// src/publish/mod.rs
//! Publisher set: one adapter per destination platform, one instance per
//! configured account, each with its own credential and the shared retry
//! policy. One account's failure never blocks another.

pub mod photo;
pub mod text;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::retry::{snippet, Attempt};

pub use photo::PhotoPublisher;
pub use text::TextPublisher;

/// Photo-capable platform: needs a direct image URL plus a caption.
#[async_trait]
pub trait PhotoPoster: Send + Sync {
    /// Returns the remote post identifier.
    async fn post_photo(&self, image_url: &str, caption: &str) -> Result<String, ApiError>;
    /// Account identifier for log lines.
    fn label(&self) -> String;
}

/// Text-only platform.
#[async_trait]
pub trait TextPoster: Send + Sync {
    async fn post_text(&self, text: &str) -> Result<String, ApiError>;
    fn label(&self) -> String;
}

/// Shared non-2xx mapping for publish endpoints: 5xx retried, everything
/// else fatal.
pub(crate) fn classify_failure<T>(platform: &str, code: u16, body: &str) -> Attempt<T> {
    if code >= 500 {
        Attempt::Retry(ApiError::Server(code))
    } else {
        tracing::error!(platform, status = code, body = %snippet(body), "publish client error");
        Attempt::Fatal(ApiError::Client(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_fatal() {
        assert!(matches!(
            classify_failure::<()>("photo", 503, ""),
            Attempt::Retry(ApiError::Server(503))
        ));
        assert!(matches!(
            classify_failure::<()>("photo", 403, "denied"),
            Attempt::Fatal(ApiError::Client(403))
        ));
    }
}
