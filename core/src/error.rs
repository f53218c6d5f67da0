//! Error types for the blockchain-database query layer.
//!
//! # Design
//! Every failure a query can hit is one `QueryError` variant, and every
//! variant travels through the same `Result` channel as success data. The
//! variants follow the order in which a request can fail: building the URL,
//! submitting the request, the HTTP exchange itself, and finally decoding
//! the body.

use thiserror::Error;

/// Errors returned by every query operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The base URL, or a URL derived from it, could not be parsed.
    #[error("invalid URL: {0}")]
    Url(String),

    /// The request could not be built or serialized, or the transport failed
    /// before an HTTP exchange completed. Safe to retry.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The exchange completed with a status outside the method's accepted set.
    #[error("unexpected HTTP status {status}")]
    Response { status: u16 },

    /// The status was accepted but the server sent no body.
    #[error("response carried no data")]
    NoData,

    /// The body is not JSON, or not the envelope the query expected.
    #[error("malformed JSON: {0}")]
    JsonParse(String),

    /// The JSON is well formed but does not map onto the model type.
    #[error("model mismatch: {0}")]
    Model(String),
}

impl QueryError {
    /// Whether retrying the same query could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Submission(_))
    }

    /// Map a `serde_json` failure onto the parse/model split: syntax and
    /// truncation are `JsonParse`, type or field mismatches are `Model`.
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => QueryError::Model(err.to_string()),
            _ => QueryError::JsonParse(err.to_string()),
        }
    }
}

/// Result alias used throughout the crate.
pub type QueryResult<T> = Result<T, QueryError>;
