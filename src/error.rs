//! # error
//!
//! Centralised error types.
//!
//! [`ErrorKind`] is the wire-level classification carried inside
//! `order_result` messages. [`SourceError`] is what broker source
//! implementations return. [`AppError`] is the axum-facing error whose
//! `IntoResponse` impl produces structured JSON bodies, so callers always
//! get a machine-readable response even on failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

// ─── ErrorKind ────────────────────────────────────────────────────────────────

/// Classification of every way a request can fail, surfaced verbatim to
/// the requesting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No trustworthy connectivity to the broker.
    #[error("source unavailable")]
    SourceUnavailable,

    /// An upstream call exceeded its deadline before anything was sent.
    #[error("upstream call timed out")]
    TimeoutError,

    /// Data is older than the freshness threshold. Surfaced, never retried
    /// automatically.
    #[error("data is stale")]
    StaleData,

    #[error("spread too wide")]
    SpreadTooWide,

    #[error("outside trading hours")]
    OutsideTradingHours,

    #[error("daily trade limit reached")]
    DailyLimitReached,

    #[error("invalid parameters")]
    InvalidParameters,

    /// Operation not implemented by the active broker source variant.
    #[error("unsupported by the active source")]
    Unsupported,

    /// The order was sent but its outcome is unknown (e.g. the response was
    /// lost). Requires manual reconciliation, never an automatic resend.
    #[error("order outcome unknown")]
    Ambiguous,
}

impl ErrorKind {
    /// Only transient connectivity faults may be retried after backoff.
    /// Business rejections are decisions, not faults, and `Ambiguous` must
    /// never be resent (a duplicate could double an open position).
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::SourceUnavailable | ErrorKind::TimeoutError)
    }
}

// ─── SourceError ──────────────────────────────────────────────────────────────

/// Failure modes of a [`BrokerSource`](crate::source::BrokerSource) call.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unavailable(String),

    #[error("call timed out after {0}s")]
    Timeout(u64),

    #[error("bridge data is {age_secs}s old (max {max_age_secs}s)")]
    Stale { age_secs: i64, max_age_secs: i64 },

    #[error("operation not supported by the {0} source")]
    Unsupported(&'static str),

    /// The broker received the request and said no.
    #[error("broker rejected: {0}")]
    Rejected(String),

    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    /// The request may have reached the broker but no response came back.
    #[error("order sent but outcome unknown: {0}")]
    Ambiguous(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Unavailable(_) => ErrorKind::SourceUnavailable,
            SourceError::Timeout(_) => ErrorKind::TimeoutError,
            SourceError::Stale { .. } => ErrorKind::StaleData,
            SourceError::Unsupported(_) => ErrorKind::Unsupported,
            SourceError::Rejected(_) => ErrorKind::InvalidParameters,
            SourceError::Malformed(_) => ErrorKind::SourceUnavailable,
            SourceError::Ambiguous(_) => ErrorKind::Ambiguous,
        }
    }

    /// `true` for errors that mean the upstream connection itself is gone
    /// for good, as opposed to a slow or flaky poll.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Unsupported(_))
    }
}

// ─── AppError ─────────────────────────────────────────────────────────────────

/// Error type returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Source(err) => match err {
                SourceError::Unsupported(_) => (StatusCode::NOT_IMPLEMENTED, err.to_string()),
                SourceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
                _ => (StatusCode::BAD_GATEWAY, err.to_string()),
            },
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_faults_are_retryable() {
        assert!(ErrorKind::SourceUnavailable.is_retryable());
        assert!(ErrorKind::TimeoutError.is_retryable());
        assert!(!ErrorKind::SpreadTooWide.is_retryable());
        assert!(!ErrorKind::DailyLimitReached.is_retryable());
        assert!(!ErrorKind::Ambiguous.is_retryable());
    }

    #[test]
    fn source_error_maps_to_wire_kind() {
        assert_eq!(
            SourceError::Timeout(5).kind(),
            ErrorKind::TimeoutError
        );
        assert_eq!(
            SourceError::Unsupported("file").kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            SourceError::Ambiguous("send ok, read failed".into()).kind(),
            ErrorKind::Ambiguous
        );
    }
}
