//! # routes::status
//!
//! Read-only monitor endpoints plus the REST trading switches.
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | liveness (unauthenticated)           |
//! | GET    | `/api/status`          | market/account/connectivity snapshot |
//! | GET    | `/api/parameters`      | current trading parameters           |
//! | GET    | `/api/market/candles`  | historical bars from the source      |
//! | POST   | `/api/trading/start`   | enable the automated strategy        |
//! | POST   | `/api/trading/stop`    | disable the automated strategy       |
//! | POST   | `/api/trading/command` | forward a raw command to the source  |

use std::sync::atomic::Ordering;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::models::Timeframe;
use crate::routes::stream::set_strategy_enabled;
use crate::state::SharedState;

// ─── GET /health ──────────────────────────────────────────────────────────────

pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":     true,
        "status": "healthy",
        "source": state.source.name(),
        "state":  state.freshness.state(),
    }))
}

// ─── GET /api/status ──────────────────────────────────────────────────────────

pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let market = state.latest_market();
    let counter = state.gate.counter().await;
    let params = state.params.read().await.clone();

    Json(json!({
        "ok":               true,
        "source":           state.source.name(),
        "state":            state.freshness.state(),
        "last_update":      state.freshness.last_success(),
        "account":          market.account,
        "tick":             market.tick,
        "tick_count":       state.tick_count.load(Ordering::Relaxed),
        "update_count":     state.update_count.load(Ordering::Relaxed),
        "orders_forwarded": state.gate.forwarded_count(),
        "trades_today":     counter.count,
        "strategy_enabled": params.strategy_enabled,
        "sessions":         state.sessions.count(),
        "uptime_secs":      (Utc::now() - state.started_at).num_seconds(),
    }))
}

// ─── GET /api/parameters ──────────────────────────────────────────────────────

pub async fn get_parameters(State(state): State<SharedState>) -> impl IntoResponse {
    let params = state.params.read().await.clone();
    Json(json!({ "ok": true, "parameters": params }))
}

// ─── GET /api/market/candles ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CandlesQuery {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub count: Option<usize>,
}

pub async fn get_candles(
    State(state): State<SharedState>,
    Query(query): Query<CandlesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let symbol = query.symbol.unwrap_or_else(|| state.settings.symbol.clone());
    let timeframe: Timeframe = query
        .timeframe
        .as_deref()
        .unwrap_or("M15")
        .parse()
        .map_err(AppError::BadRequest)?;
    let count = query.count.unwrap_or(100).min(1_000);

    let candles = state.source.candles(&symbol, timeframe, count).await?;
    Ok(Json(json!({
        "ok":      true,
        "count":   candles.len(),
        "candles": candles,
    })))
}

// ─── POST /api/trading/start | /api/trading/stop ──────────────────────────────

pub async fn start_trading(State(state): State<SharedState>) -> impl IntoResponse {
    set_strategy_enabled(&state, true).await;
    Json(json!({ "ok": true, "strategy_enabled": true }))
}

pub async fn stop_trading(State(state): State<SharedState>) -> impl IntoResponse {
    set_strategy_enabled(&state, false).await;
    Json(json!({ "ok": true, "strategy_enabled": false }))
}

// ─── POST /api/trading/command ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Forward a non-order command (e.g. `close_position`) to the active
/// source. In file mode this only enqueues it for the bridge poll.
pub async fn post_command(
    State(state): State<SharedState>,
    Json(body): Json<CommandBody>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.source.submit_command(&body.name, body.params).await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SourceMode};
    use crate::models::InstrumentSpec;
    use crate::source::{build_source, new_command_queue};
    use crate::state::{build_state, SharedState};
    use std::path::PathBuf;
    use std::time::Duration;

    fn mock_state() -> SharedState {
        let settings = Settings {
            bind_addr: "127.0.0.1:0".into(),
            api_key: None,
            bridge_secret: None,
            source_mode: SourceMode::Mock,
            terminal_base_url: "http://localhost:8081".into(),
            call_timeout: Duration::from_secs(1),
            bridge_file: PathBuf::from("bridge.json"),
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

    #[tokio::test]
    async fn candles_come_back_on_the_requested_timeframe() {
        let state = mock_state();
        let result = get_candles(
            State(state),
            Query(CandlesQuery {
                symbol: None,
                timeframe: Some("M5".into()),
                count: Some(12),
            }),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn bad_timeframe_is_a_bad_request() {
        let state = mock_state();
        let result = get_candles(
            State(state),
            Query(CandlesQuery {
                symbol: None,
                timeframe: Some("M7".into()),
                count: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn rest_switches_flip_the_strategy_flag() {
        let state = mock_state();
        start_trading(State(state.clone())).await;
        assert!(state.params.read().await.strategy_enabled);
        stop_trading(State(state.clone())).await;
        assert!(!state.params.read().await.strategy_enabled);
    }

    #[tokio::test]
    async fn commands_round_trip_through_the_mock_source() {
        let state = mock_state();
        let result = post_command(
            State(state),
            Json(CommandBody {
                name: "close_position".into(),
                params: json!({ "ticket": 7 }),
            }),
        )
        .await;
        assert!(result.is_ok());
    }
}
