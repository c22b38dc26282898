//! # gate
//!
//! [`AdmissionGate`] — the last layer in front of the broker. Every order
//! request, manual or signal-originated, passes the same ordered checks
//! before it is allowed to reach [`BrokerSource::submit_order`]:
//!
//! 1. connectivity must be `Connected` (a stale source may be showing an
//!    out-of-date price; executing against it is unsafe)
//! 2. current time inside the trading window
//! 3. spread within the configured maximum (equality passes)
//! 4. daily trade count below the limit (reset on day rollover)
//! 5. volume and SL/TP distances sane and within instrument bounds
//!
//! All checks **and** the submit call run inside one critical section per
//! account, so concurrent requests are serialized and the daily counter
//! can never be raced past its limit. Rejected orders are never retried
//! here; a rejection is a decision, not a fault.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::freshness::{ConnectivityState, FreshnessMonitor};
use crate::models::{InstrumentSpec, OrderRequest, OrderResult, Side, TradingParameters};
use crate::source::BrokerSource;

// ─── DailyTradeCounter ────────────────────────────────────────────────────────

/// Trades admitted so far in the current calendar day (UTC).
#[derive(Debug, Clone, Serialize)]
pub struct DailyTradeCounter {
    pub count: u32,
    pub window_start_day: NaiveDate,
}

impl DailyTradeCounter {
    fn new(today: NaiveDate) -> Self {
        Self {
            count: 0,
            window_start_day: today,
        }
    }

    /// Reset the window exactly once when the day has rolled over.
    fn roll_over(&mut self, today: NaiveDate) {
        if today != self.window_start_day {
            info!(
                previous_day = %self.window_start_day,
                trades = self.count,
                "daily trade counter reset"
            );
            self.count = 0;
            self.window_start_day = today;
        }
    }
}

// ─── AdmissionGate ────────────────────────────────────────────────────────────

pub struct AdmissionGate {
    source: Arc<dyn BrokerSource>,
    freshness: Arc<FreshnessMonitor>,
    params: Arc<RwLock<TradingParameters>>,
    /// Single logical lane per account: checks + submit are one atomic
    /// critical section.
    lane: Mutex<DailyTradeCounter>,
    forwarded: AtomicU64,
}

impl AdmissionGate {
    pub fn new(
        source: Arc<dyn BrokerSource>,
        freshness: Arc<FreshnessMonitor>,
        params: Arc<RwLock<TradingParameters>>,
    ) -> Self {
        Self {
            source,
            freshness,
            params,
            lane: Mutex::new(DailyTradeCounter::new(Utc::now().date_naive())),
            forwarded: AtomicU64::new(0),
        }
    }

    /// Number of orders actually forwarded to the broker source.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub async fn counter(&self) -> DailyTradeCounter {
        self.lane.lock().await.clone()
    }

    /// Validate and, if everything passes, execute `request`.
    pub async fn admit(&self, request: OrderRequest) -> OrderResult {
        self.admit_at(request, Utc::now()).await
    }

    pub async fn admit_at(&self, request: OrderRequest, now: DateTime<Utc>) -> OrderResult {
        let mut counter = self.lane.lock().await;

        // [1] connectivity
        let state = self.freshness.state_at(now);
        if state != ConnectivityState::Connected {
            warn!(?state, request = %request.request_id, "order refused: source not connected");
            return OrderResult::rejected(
                request.request_id,
                ErrorKind::SourceUnavailable,
                format!("source is {state:?}"),
            );
        }

        let params = self.params.read().await.clone();

        // [2] trading window
        if !params.in_trading_window(now.time()) {
            return OrderResult::rejected(
                request.request_id,
                ErrorKind::OutsideTradingHours,
                format!(
                    "{} is outside [{} .. {})",
                    now.time().format("%H:%M:%S"),
                    params.trading_start,
                    params.trading_end
                ),
            );
        }

        let instrument = match self.source.instrument(&request.symbol).await {
            Ok(spec) => spec,
            Err(e) => return OrderResult::rejected(request.request_id, e.kind(), e.to_string()),
        };
        let tick = match self.source.tick(&request.symbol).await {
            Ok(tick) => tick,
            Err(e) => return OrderResult::rejected(request.request_id, e.kind(), e.to_string()),
        };

        // [3] spread (boundary equality is acceptable)
        let spread_pips = instrument.spread_pips(tick.bid, tick.ask);
        if spread_pips > params.max_spread_pips {
            return OrderResult::rejected(
                request.request_id,
                ErrorKind::SpreadTooWide,
                format!(
                    "spread {spread_pips:.1} pips exceeds {:.1}",
                    params.max_spread_pips
                ),
            );
        }

        // [4] daily limit
        counter.roll_over(now.date_naive());
        if counter.count >= params.max_daily_trades {
            return OrderResult::rejected(
                request.request_id,
                ErrorKind::DailyLimitReached,
                format!("{}/{} trades today", counter.count, params.max_daily_trades),
            );
        }

        // [5] parameter sanity
        let sl_pips = request.stop_loss_pips.unwrap_or(params.stop_loss_pips);
        let tp_pips = request.take_profit_pips.unwrap_or(params.take_profit_pips);
        if sl_pips <= 0.0 || tp_pips <= 0.0 {
            return OrderResult::rejected(
                request.request_id,
                ErrorKind::InvalidParameters,
                "stop-loss and take-profit distances must be positive",
            );
        }
        if !(request.volume > 0.0
            && request.volume >= instrument.volume_min
            && request.volume <= instrument.volume_max)
        {
            return OrderResult::rejected(
                request.request_id,
                ErrorKind::InvalidParameters,
                format!(
                    "volume {} outside [{} .. {}]",
                    request.volume, instrument.volume_min, instrument.volume_max
                ),
            );
        }

        // Concrete levels from pip distances.
        let entry_price = match request.side {
            Side::Buy => tick.ask,
            Side::Sell => tick.bid,
        };
        let (sl_price, tp_price) = match request.side {
            Side::Buy => (
                entry_price - sl_pips * instrument.pip_size,
                entry_price + tp_pips * instrument.pip_size,
            ),
            Side::Sell => (
                entry_price + sl_pips * instrument.pip_size,
                entry_price - tp_pips * instrument.pip_size,
            ),
        };

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        match self
            .source
            .submit_order(&request, entry_price, sl_price, tp_price)
            .await
        {
            Ok(result) => {
                if result.accepted {
                    counter.count += 1;
                    info!(
                        ticket = ?result.ticket,
                        side = request.side.as_str(),
                        volume = request.volume,
                        entry = entry_price,
                        trades_today = counter.count,
                        "order accepted"
                    );
                } else {
                    warn!(
                        reason = ?result.reason,
                        message = ?result.message,
                        "broker rejected order"
                    );
                }
                result
            }
            Err(e) => {
                warn!(error = %e, "order submission failed");
                OrderResult::rejected(request.request_id, e.kind(), e.to_string())
            }
        }
    }
}

// ─── Position sizing ──────────────────────────────────────────────────────────

/// Risk-percent position sizing for signal-originated orders: the lot size
/// whose stop-loss distance risks `risk_percent` of the balance, snapped
/// to the instrument's volume grid. Falls back to the fixed lot size when
/// risk sizing is off or the balance is unknown.
pub fn position_size(
    params: &TradingParameters,
    instrument: &InstrumentSpec,
    balance: Option<f64>,
) -> f64 {
    let balance = match balance {
        Some(b) if b > 0.0 && params.risk_percent > 0.0 => b,
        _ => return instrument.clamp_volume(params.lot_size),
    };
    let per_pip_per_lot = instrument.tick_value * (instrument.pip_size / instrument.point);
    let risk_amount = balance * (params.risk_percent / 100.0);
    let raw = risk_amount / (params.stop_loss_pips * per_pip_per_lot + 1e-9);
    instrument.clamp_volume(raw)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
