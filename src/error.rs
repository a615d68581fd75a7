// src/error.rs
use thiserror::Error;

/// Failure taxonomy shared by every remote call site (rewrite endpoint,
/// publishing platforms, subscription hub).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network/timeout level failure before an HTTP status was obtained.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote 5xx.
    #[error("server error: HTTP {0}")]
    Server(u16),

    /// Remote 4xx other than auth; not retried.
    #[error("client error: HTTP {0}")]
    Client(u16),

    /// A credential was rejected with 401.
    #[error("unauthorized credential (HTTP 401)")]
    Unauthorized,

    /// Every rewrite credential has been rejected; permanent for the
    /// remainder of the process.
    #[error("credential pool exhausted")]
    PoolExhausted,

    /// Empty input to a call that requires content; never retried.
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    /// The remote answered 2xx but the body is not usable (missing post
    /// id, empty completion, unparseable JSON).
    #[error("malformed response: {0}")]
    Protocol(String),
}

/// A feed document (or push notification body) that could not be parsed at
/// all. Fatal for that one document, never for the surrounding batch.
#[derive(Debug, Error)]
#[error("unparseable feed document: {0}")]
pub struct ParseError(pub String);
