//! # models::instrument
//!
//! Broker-reported symbol metadata. The gate needs the pip size to turn
//! pip distances into price levels, and the volume bounds to validate
//! requested lot sizes.

use serde::{Deserialize, Serialize};

/// Trading properties of one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    /// Smallest representable price increment (MT5 "point"), e.g. `0.01`.
    pub point: f64,
    pub digits: u32,
    /// Pip size used for SL/TP and spread arithmetic. For XAUUSD this is
    /// `0.1` (ten points).
    pub pip_size: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    /// Account-currency value of one point for one lot.
    pub tick_value: f64,
}

impl InstrumentSpec {
    /// Snap `volume` to the instrument's step grid, clamped to its bounds.
    pub fn clamp_volume(&self, volume: f64) -> f64 {
        let stepped = if self.volume_step > 0.0 {
            (volume / self.volume_step).round() * self.volume_step
        } else {
            volume
        };
        stepped.clamp(self.volume_min, self.volume_max)
    }

    /// Spread expressed in pips.
    pub fn spread_pips(&self, bid: f64, ask: f64) -> f64 {
        (ask - bid) / self.pip_size
    }
}
