//! # models::order
//!
//! [`OrderRequest`] / [`OrderResult`] — the admission path's input and its
//! terminal outcome.
//!
//! A request is created once (by the command router, from a manual client
//! order or an external signal), consumed once by the gate, and never
//! mutated afterwards. The result either carries a broker ticket or the
//! rejection reason verbatim; rejected orders are never retried here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

// ─── Side ─────────────────────────────────────────────────────────────────────

/// Direction of a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

// ─── OrderRequest ─────────────────────────────────────────────────────────────

/// A single order admission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Correlation id, also used for the broker comment.
    pub request_id: Uuid,
    pub side: Side,
    pub symbol: String,
    /// Lot size. Must fall inside the instrument's volume bounds.
    pub volume: f64,
    /// Price the requester last observed; the gate executes against the
    /// current tick, this is kept for audit only.
    pub reference_price: Option<f64>,
    /// Stop-loss distance in pips. `None` falls back to the configured
    /// trading parameters.
    pub stop_loss_pips: Option<f64>,
    /// Take-profit distance in pips. `None` falls back to the configured
    /// trading parameters.
    pub take_profit_pips: Option<f64>,
    pub comment: String,
    pub requested_at: DateTime<Utc>,
}

impl OrderRequest {
    pub fn new(side: Side, symbol: &str, volume: f64, comment: &str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            side,
            symbol: symbol.to_string(),
            volume,
            reference_price: None,
            stop_loss_pips: None,
            take_profit_pips: None,
            comment: comment.to_string(),
            requested_at: Utc::now(),
        }
    }
}

// ─── OrderResult ──────────────────────────────────────────────────────────────

/// Terminal outcome of one [`OrderRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub request_id: Uuid,
    pub accepted: bool,
    /// Broker ticket, present iff `accepted`.
    pub ticket: Option<u64>,
    /// Rejection or fault classification, present iff `!accepted`.
    pub reason: Option<ErrorKind>,
    /// Human-readable detail from the gate or the broker.
    pub message: Option<String>,
    pub filled_price: Option<f64>,
}

impl OrderResult {
    pub fn accepted(request_id: Uuid, ticket: u64, filled_price: f64) -> Self {
        Self {
            request_id,
            accepted: true,
            ticket: Some(ticket),
            reason: None,
            message: None,
            filled_price: Some(filled_price),
        }
    }

    pub fn rejected(request_id: Uuid, reason: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            request_id,
            accepted: false,
            ticket: None,
            reason: Some(reason),
            message: Some(message.into()),
            filled_price: None,
        }
    }

    /// Transient faults the caller may retry after backoff. Business
    /// rejections and ambiguous outcomes are final.
    pub fn is_retryable(&self) -> bool {
        self.reason.map(ErrorKind::is_retryable).unwrap_or(false)
    }
}
