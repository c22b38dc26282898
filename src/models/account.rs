//! # models::account
//!
//! [`AccountSnapshot`] mirrors the account block the broker terminal reports.
//! Snapshots are immutable once created and superseded by newer ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the trading account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Broker-side account login, when the upstream reports one.
    #[serde(default)]
    pub login: Option<u64>,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    /// Floating profit across open positions.
    pub profit: f64,
    /// Deposit currency, e.g. `"USD"`.
    pub currency: String,
    /// UTC timestamp when the snapshot was captured upstream.
    pub captured_at: DateTime<Utc>,
}
