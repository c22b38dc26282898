//! # Auric — Broker Connectivity & Real-Time Sync Engine
//!
//! ```text
//!  ┌─────────────┐  poll (1s tick / 5s account)  ┌──────────────────────────┐
//!  │ BrokerSource│ ◀──────────────────────────── │ StreamHub                │
//!  │ live | file │                               │ ├─ freshness monitor     │
//!  │      | mock │  POST /api/bridge/tick        │ ├─ candle builders       │
//!  └─────────────┘  GET  /api/bridge/commands    │ └─ broadcast ──────────┐ │
//!                                                └────────────────────────│─┘
//!  ┌─────────────┐  ws://host/ws/stream  ◀────────────────────────────────┘
//!  │  Dashboard  │  {subscribe, start_trading, place_order, ...}
//!  └─────────────┘  orders → AdmissionGate → BrokerSource
//! ```

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod error;
mod events;
mod freshness;
mod gate;
mod hub;
mod models;
mod routes;
mod session;
mod source;
mod state;

use auth::require_api_key;
use config::Settings;
use hub::StreamHub;
use routes::{
    bridge::{poll_commands, post_signal, push_account, push_tick},
    status::{
        get_candles, get_parameters, get_status, health, post_command, start_trading,
        stop_trading,
    },
    stream::ws_stream,
};
use source::{build_source, new_command_queue};
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("auric=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    // ── 3. Settings & shared state ────────────────────────────────────────────
    let settings = Settings::from_env();
    info!(
        source = settings.source_mode.as_str(),
        symbol = %settings.symbol,
        "auric starting"
    );

    let commands = new_command_queue();
    let source = build_source(&settings, commands.clone());
    let state = build_state(settings, source, commands);

    // ── 4. Stream hub (the single upstream reader) ────────────────────────────
    StreamHub::spawn(state.clone());

    // ── 5. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        // ── Client stream ─────────────────────────────────────────────────────
        .route("/ws/stream",            get(ws_stream))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/api/status",           get(get_status))
        .route("/api/parameters",       get(get_parameters))
        .route("/api/market/candles",   get(get_candles))
        // ── Trading switches ──────────────────────────────────────────────────
        .route("/api/trading/start",    post(start_trading))
        .route("/api/trading/stop",     post(stop_trading))
        .route("/api/trading/command",  post(post_command))
        // ── EA bridge surface ─────────────────────────────────────────────────
        .route("/api/bridge/tick",      post(push_tick))
        .route("/api/bridge/account",   post(push_account))
        .route("/api/bridge/signal",    post(post_signal))
        .route("/api/bridge/commands",  get(poll_commands))
        // ── Health ────────────────────────────────────────────────────────────
        .route("/health",               get(health))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    // ── 7. Bind & serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = state.settings.bind_addr.parse()?;
    info!(?addr, "🚀 auric server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
