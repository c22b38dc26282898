//! # source::live
//!
//! [`LiveSource`] — HTTP adapter for the terminal-side EA.
//!
//! ## Adapter contract
//! The EA exposes a small JSON surface:
//! - `GET  /health` — liveness
//! - `GET  /tick?symbol=` → `{symbol, bid, ask, time}`
//! - `GET  /account` → `{login, balance, equity, margin, free_margin, profit, currency}`
//! - `GET  /candles?symbol=&timeframe=&count=` → `[{time, open, high, low, close}]`
//! - `GET  /symbol?symbol=` → instrument metadata
//! - `POST /order/send` → `{retcode, order, comment}`; retcode 10009 =
//!   `TRADE_RETCODE_DONE`, anything else is a broker rejection
//!
//! Every call carries a bounded timeout. A timeout on a read is a plain
//! `Timeout`; a timeout on `/order/send` is `Ambiguous`, because the order
//! may have been executed even though the response was lost.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::SourceError;
use crate::models::{
    AccountSnapshot, Candle, InstrumentSpec, OrderRequest, OrderResult, TickSample, Timeframe,
};
use crate::source::BrokerSource;

/// Magic number stamped on every order this engine places.
const ORDER_MAGIC: u64 = 770_001;

/// Only retcode that counts as success (`TRADE_RETCODE_DONE`).
const RETCODE_DONE: u32 = 10_009;

pub struct LiveSource {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl LiveSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_read_error(e))?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "terminal returned HTTP {} for {path}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }

    fn map_read_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::Timeout(self.timeout.as_secs())
        } else {
            SourceError::Unavailable(e.to_string())
        }
    }
}

// ─── Wire payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TerminalTick {
    symbol: String,
    bid: f64,
    ask: f64,
    time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TerminalAccount {
    #[serde(default)]
    login: Option<u64>,
    balance: f64,
    equity: f64,
    margin: f64,
    free_margin: f64,
    profit: f64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct TerminalCandle {
    time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct TerminalSymbol {
    symbol: String,
    point: f64,
    digits: u32,
    #[serde(default)]
    pip_size: Option<f64>,
    volume_min: f64,
    volume_max: f64,
    volume_step: f64,
    tick_value: f64,
}

#[derive(Debug, serde::Serialize)]
struct TerminalOrder {
    symbol: String,
    action: &'static str,
    volume: f64,
    price: f64,
    sl: f64,
    tp: f64,
    comment: String,
    magic: u64,
}

#[derive(Debug, Deserialize)]
struct TerminalOrderResponse {
    retcode: u32,
    order: Option<u64>,
    comment: Option<String>,
    #[serde(default)]
    price: Option<f64>,
}

// ─── BrokerSource impl ────────────────────────────────────────────────────────

#[async_trait]
impl BrokerSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn probe(&self) -> Result<(), SourceError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_read_error(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SourceError::Unavailable(format!(
                "terminal health returned HTTP {}",
                response.status()
            )))
        }
    }

    async fn account(&self) -> Result<AccountSnapshot, SourceError> {
        let raw: TerminalAccount = self.get_json("/account", &[]).await?;
        Ok(AccountSnapshot {
            login: raw.login,
            balance: raw.balance,
            equity: raw.equity,
            margin: raw.margin,
            free_margin: raw.free_margin,
            profit: raw.profit,
            currency: raw.currency,
            captured_at: Utc::now(),
        })
    }

    async fn tick(&self, symbol: &str) -> Result<TickSample, SourceError> {
        let raw: TerminalTick = self
            .get_json("/tick", &[("symbol", symbol.to_string())])
            .await?;
        let tick = TickSample {
            symbol: raw.symbol,
            bid: raw.bid,
            ask: raw.ask,
            captured_at: raw.time,
        };
        if !tick.is_coherent() {
            return Err(SourceError::Malformed(format!(
                "incoherent quote bid={} ask={}",
                tick.bid, tick.ask
            )));
        }
        Ok(tick)
    }

    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let raw: Vec<TerminalCandle> = self
            .get_json(
                "/candles",
                &[
                    ("symbol", symbol.to_string()),
                    ("timeframe", timeframe.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|c| Candle {
                symbol: symbol.to_string(),
                open_time: timeframe.bucket_start(c.time),
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                timeframe,
            })
            .collect())
    }

    async fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, SourceError> {
        let raw: TerminalSymbol = self
            .get_json("/symbol", &[("symbol", symbol.to_string())])
            .await?;
        Ok(InstrumentSpec {
            symbol: raw.symbol,
            point: raw.point,
            digits: raw.digits,
            // Brokers usually quote pips as ten points.
            pip_size: raw.pip_size.unwrap_or(raw.point * 10.0),
            volume_min: raw.volume_min,
            volume_max: raw.volume_max,
            volume_step: raw.volume_step,
            tick_value: raw.tick_value,
        })
    }

    async fn submit_order(
        &self,
        request: &OrderRequest,
        entry_price: f64,
        sl_price: f64,
        tp_price: f64,
    ) -> Result<OrderResult, SourceError> {
        let payload = TerminalOrder {
            symbol: request.symbol.clone(),
            action: request.side.as_str(),
            volume: request.volume,
            price: entry_price,
            sl: sl_price,
            tp: tp_price,
            comment: request.comment.clone(),
            magic: ORDER_MAGIC,
        };

        let url = format!("{}/order/send", self.base_url);
        info!(
            symbol = %payload.symbol,
            action = payload.action,
            volume = payload.volume,
            price = payload.price,
            sl = payload.sl,
            tp = payload.tp,
            "sending order to terminal"
        );

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    error!(error = %e, "terminal unreachable, order not sent");
                    SourceError::Unavailable(e.to_string())
                } else {
                    // The request may have gone out before the failure;
                    // assume partial effect.
                    error!(error = %e, "order send failed mid-flight");
                    SourceError::Ambiguous(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "terminal returned HTTP error");
            return Err(SourceError::Unavailable(format!(
                "terminal HTTP {status}: {body}"
            )));
        }

        let raw: TerminalOrderResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Ambiguous(format!("order response lost: {e}")))?;

        if raw.retcode != RETCODE_DONE {
            let msg = format!(
                "retcode={} comment={}",
                raw.retcode,
                raw.comment.as_deref().unwrap_or("unknown")
            );
            warn!(%msg, "terminal rejected order");
            return Ok(OrderResult::rejected(
                request.request_id,
                crate::error::ErrorKind::InvalidParameters,
                msg,
            ));
        }

        let ticket = raw.order.ok_or_else(|| {
            SourceError::Malformed("accepted order without ticket".to_string())
        })?;
        info!(ticket, "terminal accepted order");
        Ok(OrderResult::accepted(
            request.request_id,
            ticket,
            raw.price.unwrap_or(entry_price),
        ))
    }

    async fn submit_command(&self, name: &str, params: Value) -> Result<Value, SourceError> {
        let url = format!("{}/command", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "name": name, "params": params }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_read_error(e))?;
        if !response.status().is_success() {
            return Err(SourceError::Unavailable(format!(
                "terminal command returned HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }
}
