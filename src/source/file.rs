//! # source::file
//!
//! [`FileBridgeSource`] — degraded, read-only observation through a relay
//! document that an external process rewrites periodically.
//!
//! The document is considered fresh iff its modification time is within
//! `max_age` of now. Reads simply re-parse the most recent contents; the
//! external process may also push tick/account updates over the bridge
//! HTTP surface, which land in the same cache.
//!
//! Orders cannot be confirmed synchronously through a file, so
//! `submit_order` is `Unsupported`; `submit_command` enqueues onto the
//! out-of-band command queue the bridge process polls.

use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::models::{
    AccountSnapshot, Candle, InstrumentSpec, OrderRequest, OrderResult, TickSample, Timeframe,
};
use crate::source::{BridgeCommand, BrokerSource, CommandQueue};

// ─── Bridge document ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct BridgeDocument {
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
    account: BridgeAccount,
    tick: BridgeTick,
}

#[derive(Debug, Clone, Deserialize)]
struct BridgeAccount {
    #[serde(default)]
    login: Option<u64>,
    balance: f64,
    equity: f64,
    margin: f64,
    profit: f64,
    currency: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BridgeTick {
    symbol: String,
    bid: f64,
    ask: f64,
    time: DateTime<Utc>,
}

// ─── Cache ────────────────────────────────────────────────────────────────────

/// Latest known data and when it was obtained. `as_of` is the file mtime
/// for parsed documents and the arrival time for pushed updates; freshness
/// is judged on it, not on the timestamps embedded in the payload.
#[derive(Debug, Default)]
struct Cache {
    tick: Option<(TickSample, DateTime<Utc>)>,
    account: Option<(AccountSnapshot, DateTime<Utc>)>,
    parsed_mtime: Option<DateTime<Utc>>,
}

// ─── FileBridgeSource ─────────────────────────────────────────────────────────

pub struct FileBridgeSource {
    path: PathBuf,
    max_age: chrono::Duration,
    instrument: InstrumentSpec,
    cache: RwLock<Cache>,
    commands: CommandQueue,
}

impl FileBridgeSource {
    pub fn new(
        path: PathBuf,
        max_age: Duration,
        instrument: InstrumentSpec,
        commands: CommandQueue,
    ) -> Self {
        Self {
            path,
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            instrument,
            cache: RwLock::new(Cache::default()),
            commands,
        }
    }

    /// Re-parse the relay file when it has been rewritten since the last
    /// read. Pushed updates newer than the file are kept.
    fn refresh_from_file(&self) {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "bridge file not readable");
                return;
            }
        };

        {
            let cache = self.cache.read().expect("bridge cache poisoned");
            if cache.parsed_mtime == Some(mtime) {
                return;
            }
        }

        let doc: BridgeDocument = match std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
        {
            Ok(doc) => doc,
            Err(e) => {
                // A half-written file shows up as a parse error; the next
                // rewrite will be picked up.
                warn!(path = %self.path.display(), error = %e, "bridge document parse failed");
                return;
            }
        };

        let tick = TickSample {
            symbol: doc.tick.symbol.clone(),
            bid: doc.tick.bid,
            ask: doc.tick.ask,
            captured_at: doc.tick.time,
        };
        if !tick.is_coherent() {
            warn!(bid = tick.bid, ask = tick.ask, "bridge document carries incoherent quote");
            return;
        }
        let account = AccountSnapshot {
            login: doc.account.login,
            balance: doc.account.balance,
            equity: doc.account.equity,
            margin: doc.account.margin,
            free_margin: doc.account.equity - doc.account.margin,
            profit: doc.account.profit,
            currency: doc.account.currency.clone(),
            captured_at: doc.tick.time,
        };

        let mut cache = self.cache.write().expect("bridge cache poisoned");
        cache.parsed_mtime = Some(mtime);
        if cache.tick.as_ref().map(|(_, at)| *at < mtime).unwrap_or(true) {
            cache.tick = Some((tick, mtime));
        }
        if cache.account.as_ref().map(|(_, at)| *at < mtime).unwrap_or(true) {
            cache.account = Some((account, mtime));
        }
    }

    fn ensure_fresh(&self, as_of: DateTime<Utc>) -> Result<(), SourceError> {
        let age = Utc::now() - as_of;
        if age > self.max_age {
            Err(SourceError::Stale {
                age_secs: age.num_seconds(),
                max_age_secs: self.max_age.num_seconds(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerSource for FileBridgeSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn probe(&self) -> Result<(), SourceError> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(SourceError::Unavailable(format!(
                "bridge file {} does not exist",
                self.path.display()
            )))
        }
    }

    async fn account(&self) -> Result<AccountSnapshot, SourceError> {
        self.refresh_from_file();
        let cache = self.cache.read().expect("bridge cache poisoned");
        let (account, as_of) = cache
            .account
            .clone()
            .ok_or_else(|| SourceError::Unavailable("no bridge data yet".to_string()))?;
        self.ensure_fresh(as_of)?;
        Ok(account)
    }

    async fn tick(&self, symbol: &str) -> Result<TickSample, SourceError> {
        self.refresh_from_file();
        let cache = self.cache.read().expect("bridge cache poisoned");
        let (tick, as_of) = cache
            .tick
            .clone()
            .ok_or_else(|| SourceError::Unavailable("no bridge data yet".to_string()))?;
        self.ensure_fresh(as_of)?;
        if tick.symbol != symbol {
            return Err(SourceError::Unavailable(format!(
                "bridge relays {}, not {symbol}",
                tick.symbol
            )));
        }
        Ok(tick)
    }

    async fn candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _count: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        // The relay document carries no history.
        Err(SourceError::Unsupported(self.name()))
    }

    async fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, SourceError> {
        if symbol == self.instrument.symbol {
            Ok(self.instrument.clone())
        } else {
            Err(SourceError::Unavailable(format!(
                "no metadata for {symbol}"
            )))
        }
    }

    async fn submit_order(
        &self,
        _request: &OrderRequest,
        _entry_price: f64,
        _sl_price: f64,
        _tp_price: f64,
    ) -> Result<OrderResult, SourceError> {
        // A file cannot carry an order confirmation back.
        Err(SourceError::Unsupported(self.name()))
    }

    async fn submit_command(&self, name: &str, params: Value) -> Result<Value, SourceError> {
        let command = BridgeCommand::new(name, params);
        let id = command.id;
        let mut queue = self.commands.lock().expect("command queue poisoned");
        queue.push_back(command);
        debug!(%id, name, pending = queue.len(), "command queued for bridge poll");
        Ok(serde_json::json!({ "queued": true, "id": id }))
    }

    async fn ingest_tick(&self, tick: TickSample) -> Result<(), SourceError> {
        if !tick.is_coherent() {
            return Err(SourceError::Malformed(format!(
                "incoherent quote bid={} ask={}",
                tick.bid, tick.ask
            )));
        }
        let mut cache = self.cache.write().expect("bridge cache poisoned");
        cache.tick = Some((tick, Utc::now()));
        Ok(())
    }

    async fn ingest_account(&self, account: AccountSnapshot) -> Result<(), SourceError> {
        let mut cache = self.cache.write().expect("bridge cache poisoned");
        cache.account = Some((account, Utc::now()));
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
