//! # models::candle
//!
//! OHLC bars built from the live tick stream, plus the [`Timeframe`] grid
//! they are bucketed on. Historical bars are immutable once their bucket
//! closes; only the most recent bar of each timeframe is still mutable.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ─── Timeframe ────────────────────────────────────────────────────────────────

/// Bar interval, named the way the terminal names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn bucket_secs(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Start of the bucket containing `t`, aligned to the Unix epoch.
    pub fn bucket_start(self, t: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.bucket_secs();
        let aligned = t.timestamp().div_euclid(secs) * secs;
        Utc.timestamp_opt(aligned, 0).single().unwrap_or(t)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Candle ───────────────────────────────────────────────────────────────────

/// One OHLC bar on a fixed timeframe grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// Bucket start, aligned per [`Timeframe::bucket_start`].
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub timeframe: Timeframe,
}

impl Candle {
    pub fn new(symbol: &str, timeframe: Timeframe, time: DateTime<Utc>, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            open_time: timeframe.bucket_start(time),
            open: price,
            high: price,
            low: price,
            close: price,
            timeframe,
        }
    }

    pub fn update(&mut self, price: f64) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
    }
}

// ─── CandleBuilder ────────────────────────────────────────────────────────────

/// Builds bars for one (symbol, timeframe) pair from the live tick stream.
///
/// `apply` mutates the open bar in place; when a tick lands in a newer
/// bucket the finished bar is returned so the hub can emit a close event.
#[derive(Debug)]
pub struct CandleBuilder {
    symbol: String,
    timeframe: Timeframe,
    current: Option<Candle>,
}

impl CandleBuilder {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            current: None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Feed one tick; returns the closed bar when the bucket rolled over.
    pub fn apply(&mut self, price: f64, time: DateTime<Utc>) -> Option<Candle> {
        let bucket = self.timeframe.bucket_start(time);
        match self.current.as_mut() {
            Some(bar) if bar.open_time == bucket => {
                bar.update(price);
                None
            }
            Some(bar) => {
                let closed = bar.clone();
                self.current = Some(Candle::new(&self.symbol, self.timeframe, time, price));
                Some(closed)
            }
            None => {
                self.current = Some(Candle::new(&self.symbol, self.timeframe, time, price));
                None
            }
        }
    }

    /// The bar currently being built, if any.
    pub fn open_bar(&self) -> Option<&Candle> {
        self.current.as_ref()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn bucket_start_aligns_to_grid() {
        let t = at(3 * 3_600 + 17 * 60 + 42);
        assert_eq!(Timeframe::M1.bucket_start(t), at(3 * 3_600 + 17 * 60));
        assert_eq!(Timeframe::M15.bucket_start(t), at(3 * 3_600 + 15 * 60));
        assert_eq!(Timeframe::H1.bucket_start(t), at(3 * 3_600));
    }

    #[test]
    fn builder_tracks_ohlc_within_bucket() {
        let mut builder = CandleBuilder::new("XAUUSD", Timeframe::M1);
        assert!(builder.apply(2385.5, at(60)).is_none());
        assert!(builder.apply(2386.0, at(75)).is_none());
        assert!(builder.apply(2384.8, at(110)).is_none());

        let bar = builder.open_bar().unwrap();
        assert_eq!(bar.open, 2385.5);
        assert_eq!(bar.high, 2386.0);
        assert_eq!(bar.low, 2384.8);
        assert_eq!(bar.close, 2384.8);
        assert_eq!(bar.open_time, at(60));
    }

    #[test]
    fn builder_closes_bar_on_rollover() {
        let mut builder = CandleBuilder::new("XAUUSD", Timeframe::M1);
        builder.apply(2385.5, at(60));
        builder.apply(2385.9, at(119));

        let closed = builder.apply(2386.2, at(121)).expect("bar should close");
        assert_eq!(closed.open_time, at(60));
        assert_eq!(closed.close, 2385.9);

        let open = builder.open_bar().unwrap();
        assert_eq!(open.open_time, at(120));
        assert_eq!(open.open, 2386.2);
    }

    #[test]
    fn timeframe_round_trips_from_str() {
        assert_eq!("m5".parse::<Timeframe>().unwrap(), Timeframe::M5);
        assert!("M2".parse::<Timeframe>().is_err());
    }
}
