//! # routes::bridge
//!
//! The authenticated surface for the external bridge process (the EA or a
//! relay script next to the terminal):
//!
//! | Method | Path                   | Description                            |
//! |--------|------------------------|----------------------------------------|
//! | POST   | `/api/bridge/tick`     | push a tick into the file-bridge cache |
//! | POST   | `/api/bridge/account`  | push an account snapshot               |
//! | POST   | `/api/bridge/signal`   | directional signal from the external strategy |
//! | GET    | `/api/bridge/commands` | poll (and drain) pending commands      |
//!
//! Every endpoint requires the shared secret, passed either as an
//! `X-Bridge-Secret` header or a `secret` query parameter. Command
//! delivery is poll-based by design: the poll interval is part of each
//! command's effective latency, nothing on this surface is synchronous
//! with the broker.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppError;
use crate::gate::position_size;
use crate::models::{AccountSnapshot, OrderRequest, Side, TickSample};
use crate::state::SharedState;

// ─── Shared secret ────────────────────────────────────────────────────────────

fn check_secret(
    state: &SharedState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<(), AppError> {
    let Some(expected) = state.settings.bridge_secret.as_deref() else {
        // no secret configured: dev mode
        return Ok(());
    };

    let provided = headers
        .get("X-Bridge-Secret")
        .and_then(|v| v.to_str().ok())
        .or_else(|| query.get("secret").map(String::as_str))
        .unwrap_or("");

    if provided == expected {
        Ok(())
    } else {
        warn!("bridge request with invalid or missing shared secret");
        Err(AppError::Unauthorized(
            "invalid or missing bridge secret".to_string(),
        ))
    }
}

// ─── Push payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TickPush {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AccountPush {
    #[serde(default)]
    pub login: Option<u64>,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    #[serde(default)]
    pub free_margin: Option<f64>,
    pub profit: f64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct SignalPush {
    #[serde(default)]
    pub symbol: Option<String>,
    pub direction: Side,
    #[serde(default)]
    pub comment: Option<String>,
}

// ─── POST /api/bridge/tick ────────────────────────────────────────────────────

pub async fn push_tick(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<TickPush>,
) -> Result<impl IntoResponse, AppError> {
    check_secret(&state, &headers, &query)?;

    let tick = TickSample {
        symbol: payload.symbol,
        bid: payload.bid,
        ask: payload.ask,
        captured_at: payload.time.unwrap_or_else(Utc::now),
    };
    if !tick.is_coherent() {
        return Err(AppError::BadRequest(format!(
            "incoherent quote bid={} ask={}",
            tick.bid, tick.ask
        )));
    }

    state.source.ingest_tick(tick).await?;
    Ok(Json(json!({ "ok": true })))
}

// ─── POST /api/bridge/account ─────────────────────────────────────────────────

pub async fn push_account(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<AccountPush>,
) -> Result<impl IntoResponse, AppError> {
    check_secret(&state, &headers, &query)?;

    let snapshot = AccountSnapshot {
        login: payload.login,
        balance: payload.balance,
        equity: payload.equity,
        margin: payload.margin,
        free_margin: payload.free_margin.unwrap_or(payload.equity - payload.margin),
        profit: payload.profit,
        currency: payload.currency,
        captured_at: Utc::now(),
    };

    state.source.ingest_account(snapshot).await?;
    Ok(Json(json!({ "ok": true })))
}

// ─── POST /api/bridge/signal ──────────────────────────────────────────────────

/// Entry point for the external strategy decision function. The signal is
/// sized from the trading parameters and runs through the same admission
/// gate as a manual order; the result goes back to the posting process,
/// which is the requester.
pub async fn post_signal(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(payload): Json<SignalPush>,
) -> Result<impl IntoResponse, AppError> {
    check_secret(&state, &headers, &query)?;

    let params = state.params.read().await.clone();
    if !params.strategy_enabled {
        return Ok(Json(json!({
            "ok":     false,
            "action": "STRATEGY_DISABLED",
            "reason": "automated trading is switched off",
        })));
    }

    let symbol = payload.symbol.unwrap_or_else(|| state.settings.symbol.clone());
    let instrument = match state.source.instrument(&symbol).await {
        Ok(spec) => spec,
        Err(_) => {
            // fall back to the configured metadata rather than dropping
            // the signal on a metadata hiccup
            let mut spec = state.settings.instrument.clone();
            spec.symbol = symbol.clone();
            spec
        }
    };
    let balance = state.latest_market().account.map(|a| a.balance);
    let volume = position_size(&params, &instrument, balance);

    let mut request = OrderRequest::new(
        payload.direction,
        &symbol,
        volume,
        payload.comment.as_deref().unwrap_or("signal"),
    );
    request.reference_price = state.latest_market().tick.map(|t| match payload.direction {
        Side::Buy => t.ask,
        Side::Sell => t.bid,
    });

    info!(
        symbol = %symbol,
        direction = payload.direction.as_str(),
        volume,
        "external signal received"
    );
    let result = state.gate.admit(request).await;

    Ok(Json(json!({
        "ok":     result.accepted,
        "action": if result.accepted { "SIGNAL_EXECUTED" } else { "SIGNAL_REJECTED" },
        "result": result,
    })))
}

// ─── GET /api/bridge/commands ─────────────────────────────────────────────────

pub async fn poll_commands(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    check_secret(&state, &headers, &query)?;

    let drained: Vec<_> = {
        let mut queue = state.commands.lock().expect("command queue poisoned");
        queue.drain(..).collect()
    };

    Ok(Json(json!({
        "ok":       true,
        "count":    drained.len(),
        "commands": drained,
    })))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SourceMode};
    use crate::models::{InstrumentSpec, Timeframe};
    use crate::source::{build_source, new_command_queue, BridgeCommand};
    use crate::state::{build_state, SharedState};
    use std::path::PathBuf;
    use std::time::Duration;

    fn state_with(source_mode: SourceMode, bridge_secret: Option<&str>) -> SharedState {
        let settings = Settings {
            bind_addr: "127.0.0.1:0".into(),
            api_key: None,
            bridge_secret: bridge_secret.map(str::to_string),
            source_mode,
            terminal_base_url: "http://localhost:8081".into(),
            call_timeout: Duration::from_secs(1),
            bridge_file: PathBuf::from("/nonexistent/bridge.json"),
            symbol: "XAUUSD".into(),
            tick_interval: Duration::from_millis(100),
            account_interval: Duration::from_millis(500),
            max_age: Duration::from_secs(30),
            hard_multiplier: 5,
            heartbeat_timeout: Duration::from_secs(30),
            broadcast_capacity: 8,
            candle_timeframes: vec![Timeframe::M1],
            mock_seed: 42,
            mock_base_price: 2_385.0,
            instrument: InstrumentSpec {
                symbol: "XAUUSD".into(),
                point: 0.01,
                digits: 2,
                pip_size: 0.1,
                volume_min: 0.01,
                volume_max: 100.0,
                volume_step: 0.01,
                tick_value: 1.0,
            },
        };
        let commands = new_command_queue();
        let source = build_source(&settings, commands.clone());
        build_state(settings, source, commands)
    }

    fn tick_payload() -> TickPush {
        TickPush {
            symbol: "XAUUSD".into(),
            bid: 2385.40,
            ask: 2385.90,
            time: None,
        }
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let state = state_with(SourceMode::File, Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert("X-Bridge-Secret", "wrong".parse().unwrap());

        let result = push_tick(
            State(state),
            headers,
            Query(HashMap::new()),
            Json(tick_payload()),
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn secret_may_come_from_the_query_string() {
        let state = state_with(SourceMode::File, Some("s3cret"));
        let mut query = HashMap::new();
        query.insert("secret".to_string(), "s3cret".to_string());

        let result = push_tick(
            State(state.clone()),
            HeaderMap::new(),
            Query(query),
            Json(tick_payload()),
        )
        .await;
        assert!(result.is_ok());

        // the push is now the freshest data the file source has
        let tick = state.source.tick("XAUUSD").await.unwrap();
        assert_eq!(tick.bid, 2385.40);
    }

    #[tokio::test]
    async fn incoherent_push_is_a_bad_request() {
        let state = state_with(SourceMode::File, None);
        let result = push_tick(
            State(state),
            HeaderMap::new(),
            Query(HashMap::new()),
            Json(TickPush {
                symbol: "XAUUSD".into(),
                bid: 2392.0,
                ask: 2385.0,
                time: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn pushes_are_unsupported_outside_file_mode() {
        let state = state_with(SourceMode::Mock, None);
        let result = push_tick(
            State(state),
            HeaderMap::new(),
            Query(HashMap::new()),
            Json(tick_payload()),
        )
        .await;
        assert!(matches!(result, Err(AppError::Source(_))));
    }

    #[tokio::test]
    async fn disabled_strategy_rejects_signals_before_the_gate() {
        let state = state_with(SourceMode::Mock, None);
        state.freshness.record_success();

        let before = state.gate.forwarded_count();
        let _ = post_signal(
            State(state.clone()),
            HeaderMap::new(),
            Query(HashMap::new()),
            Json(SignalPush {
                symbol: None,
                direction: Side::Buy,
                comment: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(state.gate.forwarded_count(), before);
    }

    #[tokio::test]
    async fn enabled_strategy_routes_the_signal_through_the_gate() {
        let state = state_with(SourceMode::Mock, None);
        state.freshness.record_success();
        {
            let mut params = state.params.write().await;
            let mut next = params.clone();
            next.strategy_enabled = true;
            *params = next;
        }

        let _ = post_signal(
            State(state.clone()),
            HeaderMap::new(),
            Query(HashMap::new()),
            Json(SignalPush {
                symbol: None,
                direction: Side::Buy,
                comment: Some("ema crossover".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(state.gate.forwarded_count(), 1);
    }

    #[tokio::test]
    async fn polling_drains_the_command_queue() {
        let state = state_with(SourceMode::File, None);
        state
            .commands
            .lock()
            .unwrap()
            .push_back(BridgeCommand::new("close_position", json!({ "ticket": 7 })));

        let _ = poll_commands(State(state.clone()), HeaderMap::new(), Query(HashMap::new()))
            .await
            .unwrap();
        assert!(state.commands.lock().unwrap().is_empty());
    }
}
