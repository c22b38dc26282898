//! # source
//!
//! [`BrokerSource`] — the uniform seam over every way of reaching the
//! broker. Exactly one variant is selected at startup; the rest of the
//! engine only ever sees the trait plus the freshness signal, never the
//! concrete backend.
//!
//! | Variant | Reads | Writes |
//! |-----------------------------|--------------------------|---------------------------|
//! | [`live::LiveSource`]        | HTTP to the terminal EA  | HTTP, bounded timeout     |
//! | [`file::FileBridgeSource`]  | relay document + pushes  | `Unsupported` (queue only)|
//! | [`mock::MockSource`]        | synthetic random walk    | always accepted           |

pub mod file;
pub mod live;
pub mod mock;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::config::{Settings, SourceMode};
use crate::error::SourceError;
use crate::models::{
    AccountSnapshot, Candle, InstrumentSpec, OrderRequest, OrderResult, TickSample, Timeframe,
};

// ─── BrokerSource ─────────────────────────────────────────────────────────────

/// Uniform interface over the live terminal, the file relay and the mock
/// generator.
///
/// Calls may block on network or filesystem latency; implementations apply
/// a bounded timeout and surface `SourceError::Timeout` instead of hanging.
#[async_trait]
pub trait BrokerSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap handshake. Drives the `Disconnected → Connecting` edge.
    async fn probe(&self) -> Result<(), SourceError>;

    async fn account(&self) -> Result<AccountSnapshot, SourceError>;

    async fn tick(&self, symbol: &str) -> Result<TickSample, SourceError>;

    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, SourceError>;

    async fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, SourceError>;

    /// Submit an already-admitted order. `entry_price`, `sl_price` and
    /// `tp_price` are concrete levels computed by the gate. Broker business
    /// rejections come back as an `OrderResult` with `accepted == false`;
    /// `Err` is reserved for transport faults.
    async fn submit_order(
        &self,
        request: &OrderRequest,
        entry_price: f64,
        sl_price: f64,
        tp_price: f64,
    ) -> Result<OrderResult, SourceError>;

    /// Submit a non-order command (e.g. `close_position`) to the broker
    /// side. The result shape is backend-specific JSON.
    async fn submit_command(&self, name: &str, params: Value) -> Result<Value, SourceError>;

    /// Accept a tick pushed by an external bridge process. Only the file
    /// relay supports this.
    async fn ingest_tick(&self, _tick: TickSample) -> Result<(), SourceError> {
        Err(SourceError::Unsupported(self.name()))
    }

    /// Accept an account snapshot pushed by an external bridge process.
    async fn ingest_account(&self, _account: AccountSnapshot) -> Result<(), SourceError> {
        Err(SourceError::Unsupported(self.name()))
    }
}

// ─── Pending bridge commands ──────────────────────────────────────────────────

/// A command queued for the external bridge process to pick up on its next
/// poll. The poll interval is part of the command's effective latency;
/// nothing here is synchronous.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeCommand {
    pub id: Uuid,
    pub name: String,
    pub params: Value,
    pub queued_at: DateTime<Utc>,
}

impl BridgeCommand {
    pub fn new(name: &str, params: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            params,
            queued_at: Utc::now(),
        }
    }
}

/// Shared FIFO drained by `GET /api/bridge/commands`.
pub type CommandQueue = Arc<Mutex<VecDeque<BridgeCommand>>>;

pub fn new_command_queue() -> CommandQueue {
    Arc::new(Mutex::new(VecDeque::new()))
}

// ─── Startup selection ────────────────────────────────────────────────────────

/// Build the configured source variant. This is the only place in the
/// crate that knows which backend is active.
pub fn build_source(settings: &Settings, commands: CommandQueue) -> Arc<dyn BrokerSource> {
    let source: Arc<dyn BrokerSource> = match settings.source_mode {
        SourceMode::Live => Arc::new(live::LiveSource::new(
            &settings.terminal_base_url,
            settings.call_timeout,
        )),
        SourceMode::File => Arc::new(file::FileBridgeSource::new(
            settings.bridge_file.clone(),
            settings.max_age,
            settings.instrument.clone(),
            commands,
        )),
        SourceMode::Mock => Arc::new(mock::MockSource::new(
            &settings.symbol,
            settings.instrument.clone(),
            settings.mock_base_price,
            settings.mock_seed,
        )),
    };
    info!(source = source.name(), "broker source selected");
    source
}
