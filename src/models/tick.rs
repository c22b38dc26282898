//! # models::tick
//!
//! Defines [`TickSample`], a single bid/ask observation for one instrument.
//!
//! Ticks are produced by the active [`BrokerSource`](crate::source::BrokerSource),
//! annotated with connectivity state by the hub and fanned out to every
//! subscribed session. A sample is immutable once captured; newer samples
//! supersede it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price tick for one symbol.
///
/// Invariant: `ask >= bid`. Both the bridge push endpoints and the
/// file-bridge parser reject samples that violate it, so everything
/// downstream may rely on a non-negative spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSample {
    /// The trading symbol, e.g. `"XAUUSD"`.
    pub symbol: String,

    /// Current **bid** price (the price we sell at).
    pub bid: f64,

    /// Current **ask** price (the price we buy at).
    pub ask: f64,

    /// UTC timestamp when the upstream recorded this tick.
    pub captured_at: DateTime<Utc>,
}

impl TickSample {
    /// Raw spread in price units (`ask - bid`).
    #[inline]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Mid price, used to feed the candle builders.
    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Returns `true` when the bid/ask pair is usable.
    #[inline]
    pub fn is_coherent(&self) -> bool {
        self.ask >= self.bid && self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0
    }
}
