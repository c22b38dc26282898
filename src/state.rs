//! # state
//!
//! [`AppState`] — the shared state injected into every axum handler and
//! the hub task.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};

use crate::config::Settings;
use crate::events::StreamUpdate;
use crate::freshness::FreshnessMonitor;
use crate::gate::AdmissionGate;
use crate::models::{AccountSnapshot, TickSample, TradingParameters};
use crate::session::SessionRegistry;
use crate::source::{BrokerSource, CommandQueue};

/// Latest data the hub has seen, kept for snapshot-on-connect and the
/// status endpoint.
#[derive(Debug, Default, Clone)]
pub struct LatestMarket {
    pub account: Option<AccountSnapshot>,
    pub tick: Option<TickSample>,
}

/// Top-level shared state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub source: Arc<dyn BrokerSource>,
    pub freshness: Arc<FreshnessMonitor>,
    /// Single shared parameter set; writers replace the whole struct.
    pub params: Arc<RwLock<TradingParameters>>,
    pub gate: Arc<AdmissionGate>,
    pub sessions: Arc<SessionRegistry>,

    /// Fanout channel feeding every session task. Bounded; a lagging
    /// receiver drops its oldest buffered updates, never the sender.
    pub broadcast_tx: broadcast::Sender<StreamUpdate>,

    /// Commands waiting for the external bridge process to poll.
    pub commands: CommandQueue,

    pub last_market: Arc<StdRwLock<LatestMarket>>,
    pub tick_count: Arc<AtomicU64>,
    pub update_count: Arc<AtomicU64>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(settings: Settings, source: Arc<dyn BrokerSource>, commands: CommandQueue) -> Self {
        let (broadcast_tx, _) = broadcast::channel(settings.broadcast_capacity);
        let freshness = Arc::new(FreshnessMonitor::new(
            settings.max_age,
            settings.hard_max_age(),
        ));
        let params = Arc::new(RwLock::new(TradingParameters::from_env()));
        let gate = Arc::new(AdmissionGate::new(
            source.clone(),
            freshness.clone(),
            params.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            source,
            freshness,
            params,
            gate,
            sessions: Arc::new(SessionRegistry::new()),
            broadcast_tx,
            commands,
            last_market: Arc::new(StdRwLock::new(LatestMarket::default())),
            tick_count: Arc::new(AtomicU64::new(0)),
            update_count: Arc::new(AtomicU64::new(0)),
            started_at: Utc::now(),
        }
    }

    /// Broadcast to every session task. Err just means nobody is
    /// listening right now.
    pub fn broadcast(&self, update: StreamUpdate) {
        let _ = self.broadcast_tx.send(update);
    }

    pub fn latest_market(&self) -> LatestMarket {
        self.last_market
            .read()
            .expect("market snapshot poisoned")
            .clone()
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

pub fn build_state(
    settings: Settings,
    source: Arc<dyn BrokerSource>,
    commands: CommandQueue,
) -> SharedState {
    Arc::new(AppState::new(settings, source, commands))
}
