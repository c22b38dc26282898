//! # config
//!
//! Environment-driven settings. Everything tunable lives here; the rest of
//! the engine takes values from [`Settings`] instead of reading the
//! environment directly.
//!
//! ## Key variables
//! - `SOURCE_MODE` — `live` | `file` | `mock` (default `mock`)
//! - `TERMINAL_BASE_URL` — base URL of the terminal-side adapter (live mode)
//! - `BRIDGE_FILE` — path of the relay document (file mode)
//! - `FRESH_MAX_AGE_SECS` — staleness threshold; defaults to 30s for the
//!   file source and 5s otherwise
//! - `API_KEY` — client REST key; empty means dev mode (allow all)
//! - `BRIDGE_SECRET` — shared secret for the EA bridge surface

use std::path::PathBuf;
use std::time::Duration;

use crate::models::{InstrumentSpec, Timeframe};

// ─── SourceMode ───────────────────────────────────────────────────────────────

/// Which broker source variant to run. Selected once at startup; nothing
/// downstream inspects the variant again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Live,
    File,
    Mock,
}

impl SourceMode {
    fn from_env() -> Self {
        match std::env::var("SOURCE_MODE").unwrap_or_default().to_ascii_lowercase().as_str() {
            "live" => SourceMode::Live,
            "file" => SourceMode::File,
            _ => SourceMode::Mock,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceMode::Live => "live",
            SourceMode::File => "file",
            SourceMode::Mock => "mock",
        }
    }
}

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    /// Client-facing REST key. `None` = dev mode, allow all.
    pub api_key: Option<String>,
    /// Shared secret the external bridge process must present.
    pub bridge_secret: Option<String>,

    pub source_mode: SourceMode,
    pub terminal_base_url: String,
    /// Bounded deadline for every upstream call.
    pub call_timeout: Duration,
    pub bridge_file: PathBuf,

    /// The single instrument this engine synchronizes.
    pub symbol: String,

    pub tick_interval: Duration,
    pub account_interval: Duration,
    /// Updates older than this make the source `Stale`.
    pub max_age: Duration,
    /// `Stale` degrades to `Disconnected` at `max_age * hard_multiplier`.
    pub hard_multiplier: u32,

    /// Session teardown after this long without any traffic.
    pub heartbeat_timeout: Duration,
    pub broadcast_capacity: usize,
    /// Timeframes the hub builds bars for.
    pub candle_timeframes: Vec<Timeframe>,

    pub mock_seed: u64,
    pub mock_base_price: f64,

    /// Fallback instrument metadata for sources that cannot report any
    /// (file bridge, mock).
    pub instrument: InstrumentSpec,
}

impl Settings {
    pub fn from_env() -> Self {
        let source_mode = SourceMode::from_env();
        let default_max_age = match source_mode {
            SourceMode::File => 30,
            _ => 5,
        };
        let symbol = env_str("SYMBOL", "XAUUSD");

        Self {
            bind_addr: env_str("BIND_ADDR", "0.0.0.0:3000"),
            api_key: env_opt("API_KEY"),
            bridge_secret: env_opt("BRIDGE_SECRET"),

            source_mode,
            terminal_base_url: env_str("TERMINAL_BASE_URL", "http://localhost:8081"),
            call_timeout: Duration::from_secs(env_u64("CALL_TIMEOUT_SECS", 5)),
            bridge_file: PathBuf::from(env_str("BRIDGE_FILE", "bridge.json")),

            instrument: InstrumentSpec {
                symbol: symbol.clone(),
                point: env_f64("SYMBOL_POINT", 0.01),
                digits: env_u64("SYMBOL_DIGITS", 2) as u32,
                pip_size: env_f64("SYMBOL_PIP_SIZE", 0.1),
                volume_min: env_f64("SYMBOL_VOLUME_MIN", 0.01),
                volume_max: env_f64("SYMBOL_VOLUME_MAX", 100.0),
                volume_step: env_f64("SYMBOL_VOLUME_STEP", 0.01),
                tick_value: env_f64("SYMBOL_TICK_VALUE", 1.0),
            },
            symbol,

            tick_interval: Duration::from_millis(env_u64("TICK_INTERVAL_MS", 1_000)),
            account_interval: Duration::from_millis(env_u64("ACCOUNT_INTERVAL_MS", 5_000)),
            max_age: Duration::from_secs(env_u64("FRESH_MAX_AGE_SECS", default_max_age)),
            hard_multiplier: env_u64("FRESH_HARD_MULTIPLIER", 5) as u32,

            heartbeat_timeout: Duration::from_secs(env_u64("SESSION_HEARTBEAT_SECS", 30)),
            broadcast_capacity: env_u64("BROADCAST_CAPACITY", 256) as usize,
            candle_timeframes: env_timeframes(
                "CANDLE_TIMEFRAMES",
                &[Timeframe::M1, Timeframe::M5, Timeframe::M15],
            ),

            mock_seed: env_u64("MOCK_SEED", 42),
            mock_base_price: env_f64("MOCK_BASE_PRICE", 2_385.0),
        }
    }

    /// Age at which the source is no longer usable at all.
    pub fn hard_max_age(&self) -> Duration {
        self.max_age * self.hard_multiplier.max(1)
    }
}

// ─── Env helpers ──────────────────────────────────────────────────────────────

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_timeframes(key: &str, default: &[Timeframe]) -> Vec<Timeframe> {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect(),
        _ => default.to_vec(),
    }
}
