//! # models::params
//!
//! [`TradingParameters`] — the mutable per-account configuration consulted
//! by the admission gate. There is exactly one shared instance, published
//! behind an `RwLock`; writers validate and replace the whole struct so a
//! reader never observes a half-updated set.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

// ─── TradingParameters ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingParameters {
    /// Percent of balance risked per signal-sized trade.
    pub risk_percent: f64,
    pub max_daily_trades: u32,
    /// Default stop-loss distance in pips.
    pub stop_loss_pips: f64,
    /// Default take-profit distance in pips.
    pub take_profit_pips: f64,
    /// Widest acceptable spread, in pips. Equality is still acceptable.
    pub max_spread_pips: f64,
    /// Inclusive start of the trading window (UTC).
    pub trading_start: NaiveTime,
    /// Exclusive end of the trading window (UTC).
    pub trading_end: NaiveTime,
    /// Lot size for signal-originated orders when risk sizing is disabled.
    pub lot_size: f64,
    /// Master switch for the automated strategy path.
    pub strategy_enabled: bool,
}

impl TradingParameters {
    /// Seed values, overridable through the environment. Matches the knobs
    /// the terminal-side defaults use for XAUUSD.
    pub fn from_env() -> Self {
        Self {
            risk_percent: env_f64("TRADE_RISK_PERCENT", 2.0),
            max_daily_trades: env_u32("TRADE_MAX_DAILY", 10),
            stop_loss_pips: env_f64("TRADE_STOP_LOSS_PIPS", 50.0),
            take_profit_pips: env_f64("TRADE_TAKE_PROFIT_PIPS", 100.0),
            max_spread_pips: env_f64("TRADE_MAX_SPREAD_PIPS", 5.0),
            trading_start: env_time("TRADE_WINDOW_START", NaiveTime::MIN),
            trading_end: env_time(
                "TRADE_WINDOW_END",
                NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            ),
            lot_size: env_f64("TRADE_LOT_SIZE", 0.01),
            strategy_enabled: false,
        }
    }

    /// `true` when `t` falls inside `[trading_start, trading_end)`.
    /// Windows that wrap midnight are supported.
    pub fn in_trading_window(&self, t: NaiveTime) -> bool {
        if self.trading_start <= self.trading_end {
            t >= self.trading_start && t < self.trading_end
        } else {
            t >= self.trading_start || t < self.trading_end
        }
    }

    /// Sanity-check the full set before it is published.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.risk_percent) {
            return Err("risk_percent must be within 0..=100".into());
        }
        if self.max_daily_trades == 0 {
            return Err("max_daily_trades must be at least 1".into());
        }
        if self.stop_loss_pips <= 0.0 || self.take_profit_pips <= 0.0 {
            return Err("stop-loss and take-profit distances must be positive".into());
        }
        if self.max_spread_pips <= 0.0 {
            return Err("max_spread_pips must be positive".into());
        }
        if self.lot_size <= 0.0 {
            return Err("lot_size must be positive".into());
        }
        if self.trading_start == self.trading_end {
            return Err("trading window is empty".into());
        }
        Ok(())
    }

    /// Apply a partial update, returning the candidate full set.
    pub fn patched(&self, patch: &ParameterPatch) -> Self {
        let mut next = self.clone();
        if let Some(v) = patch.risk_percent {
            next.risk_percent = v;
        }
        if let Some(v) = patch.max_daily_trades {
            next.max_daily_trades = v;
        }
        if let Some(v) = patch.stop_loss_pips {
            next.stop_loss_pips = v;
        }
        if let Some(v) = patch.take_profit_pips {
            next.take_profit_pips = v;
        }
        if let Some(v) = patch.max_spread_pips {
            next.max_spread_pips = v;
        }
        if let Some(v) = patch.trading_start {
            next.trading_start = v;
        }
        if let Some(v) = patch.trading_end {
            next.trading_end = v;
        }
        if let Some(v) = patch.lot_size {
            next.lot_size = v;
        }
        if let Some(v) = patch.strategy_enabled {
            next.strategy_enabled = v;
        }
        next
    }
}

// ─── ParameterPatch ───────────────────────────────────────────────────────────

/// Partial parameter update as sent by clients. Absent fields keep their
/// current values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterPatch {
    pub risk_percent: Option<f64>,
    pub max_daily_trades: Option<u32>,
    pub stop_loss_pips: Option<f64>,
    pub take_profit_pips: Option<f64>,
    pub max_spread_pips: Option<f64>,
    pub trading_start: Option<NaiveTime>,
    pub trading_end: Option<NaiveTime>,
    pub lot_size: Option<f64>,
    pub strategy_enabled: Option<bool>,
}

// ─── Env helpers ──────────────────────────────────────────────────────────────

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    std::env::var(key)
        .ok()
        .and_then(|v| {
            NaiveTime::parse_from_str(&v, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(&v, "%H:%M:%S"))
                .ok()
        })
        .unwrap_or(default)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TradingParameters {
        TradingParameters {
            risk_percent: 2.0,
            max_daily_trades: 10,
            stop_loss_pips: 50.0,
            take_profit_pips: 100.0,
            max_spread_pips: 5.0,
            trading_start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            trading_end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            lot_size: 0.01,
            strategy_enabled: false,
        }
    }

    #[test]
    fn window_end_is_exclusive() {
        let p = base();
        assert!(p.in_trading_window(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(p.in_trading_window(NaiveTime::from_hms_opt(23, 58, 59).unwrap()));
        // 23:59:30 is past the 23:59 end
        assert!(!p.in_trading_window(NaiveTime::from_hms_opt(23, 59, 30).unwrap()));
    }

    #[test]
    fn window_may_wrap_midnight() {
        let mut p = base();
        p.trading_start = NaiveTime::from_hms_opt(22, 0, 0).unwrap();
        p.trading_end = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert!(p.in_trading_window(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(p.in_trading_window(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
        assert!(!p.in_trading_window(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn validate_rejects_nonsense() {
        let mut p = base();
        p.stop_loss_pips = 0.0;
        assert!(p.validate().is_err());

        let mut p = base();
        p.lot_size = -1.0;
        assert!(p.validate().is_err());

        assert!(base().validate().is_ok());
    }

    #[test]
    fn patch_keeps_unset_fields() {
        let p = base();
        let patch = ParameterPatch {
            max_spread_pips: Some(8.0),
            strategy_enabled: Some(true),
            ..Default::default()
        };
        let next = p.patched(&patch);
        assert_eq!(next.max_spread_pips, 8.0);
        assert!(next.strategy_enabled);
        assert_eq!(next.stop_loss_pips, p.stop_loss_pips);
    }
}
