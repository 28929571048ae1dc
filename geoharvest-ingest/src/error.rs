//! Error types for geoharvest-ingest
//!
//! Every failure is classified so callers can decide retry vs skip vs abort
//! from the variant alone:
//! - `Transient`: network trouble, 5xx, 429. Retried with backoff.
//! - `Permanent`: other 4xx, malformed or missing required data. Never retried.
//! - `Skip`: an ineligible item. Not a failure.
//! - `BatchAborted`: a whole call exceeded its failure budget.
//! - `Cancelled`: the caller's cancellation token fired.

use reqwest::StatusCode;
use thiserror::Error;

/// Ingest error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// Retryable failure (network, 5xx, rate limited)
    #[error("Transient failure in {context}: {message}")]
    Transient { context: String, message: String },

    /// Non-retryable failure (4xx, malformed or missing data)
    #[error("Permanent failure in {context}: {message}")]
    Permanent { context: String, message: String },

    /// Item filtered out or ineligible
    #[error("Skipped {id}: {reason}")]
    Skip { id: String, reason: String },

    /// Failure budget exceeded; nothing from the call may be persisted
    #[error("{operation} aborted: {failed}/{total} items failed")]
    BatchAborted {
        operation: &'static str,
        failed: usize,
        total: usize,
    },

    /// Cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// geoharvest-common error (database, config, serialization)
    #[error("Common error: {0}")]
    Common(#[from] geoharvest_common::Error),
}

/// Result type for ingest operations
pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    pub fn transient(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Transient {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn permanent(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Permanent {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn skip(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Skip {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Should this error be retried with backoff?
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    /// Classify a non-success HTTP status
    ///
    /// 5xx and 429 are transient; every other status is permanent.
    pub fn from_status(context: impl Into<String>, status: StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP status {}", status)
        } else {
            format!("HTTP status {}: {}", status, truncate(body, 200))
        };

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Self::transient(context, message)
        } else {
            Self::permanent(context, message)
        }
    }

    /// Classify a reqwest failure
    ///
    /// Connection and timeout problems are transient; request construction
    /// and body decoding problems are permanent.
    pub fn from_reqwest(context: impl Into<String>, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(context, status, "");
        }
        if err.is_builder() || err.is_decode() {
            Self::permanent(context, err)
        } else {
            Self::transient(context, err)
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
