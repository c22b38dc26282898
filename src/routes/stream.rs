//! # routes::stream
//!
//! The persistent bidirectional client connection.
//!
//! Each WebSocket upgrade spawns one session task that owns its outbound
//! delivery path: a `tokio::select!` loop over the hub's broadcast
//! receiver and the socket's inbound half. Stream updates are filtered by
//! the session's subscription scope; command results are written back to
//! this socket only, never broadcast. A session that stays completely
//! silent past the heartbeat timeout is torn down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::{ClientCommand, StreamUpdate, WsEvent};
use crate::models::{OrderRequest, ParameterPatch, Side, Timeframe};
use crate::state::SharedState;

// ─── WebSocket handler ────────────────────────────────────────────────────────

/// Upgrade `GET /ws/stream` and attach the session to the hub fanout.
pub async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let session = state
        .sessions
        .register(&state.settings.symbol, Timeframe::M1);
    let mut symbol = session.symbol.clone();
    let mut timeframe = session.timeframe;
    info!(session = %session.id, "client session connected");

    // Current snapshot straight away, so the dashboard renders without
    // waiting for the next poll.
    let market = state.latest_market();
    let snapshot = WsEvent::AccountStatus {
        account: market.account,
        tick: market.tick,
        state: state.freshness.state(),
    };
    if sender.send(Message::Text(snapshot.to_json())).await.is_err() {
        state.sessions.remove(session.id);
        return;
    }

    loop {
        let idle = tokio::time::sleep(state.settings.heartbeat_timeout);
        tokio::pin!(idle);

        tokio::select! {
            // no traffic in either direction for the whole heartbeat window
            _ = &mut idle => {
                info!(session = %session.id, "session idle past heartbeat, closing");
                break;
            }

            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        if let Some(event) = scope_update(update, &symbol, timeframe) {
                            if sender.send(Message::Text(event.to_json())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // This session read too slowly; its view skips to
                        // the newest updates. Only its own view goes stale.
                        debug!(session = %session.id, skipped, "slow consumer dropped oldest updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(command) => {
                                route_command(&state, session.id, &mut symbol, &mut timeframe, command)
                                    .await
                            }
                            Err(e) => WsEvent::Error {
                                message: format!("unrecognized command: {e}"),
                            },
                        };
                        if sender.send(Message::Text(reply.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    // Removal is all the fanout cleanup needed; dropping `rx` detaches
    // this session from the hub immediately.
    state.sessions.remove(session.id);
    info!(session = %session.id, "client session closed");
}

// ─── Subscription scoping ─────────────────────────────────────────────────────

/// Translate a hub broadcast into the event this session should see, if
/// any. Candle closes must match both symbol and timeframe.
fn scope_update(update: StreamUpdate, symbol: &str, timeframe: Timeframe) -> Option<WsEvent> {
    match update {
        StreamUpdate::Market { account, tick, state } => {
            let tick = tick.filter(|t| t.symbol == symbol);
            Some(WsEvent::AccountStatus { account, tick, state })
        }
        StreamUpdate::CandleClosed { candle } => {
            (candle.symbol == symbol && candle.timeframe == timeframe)
                .then_some(WsEvent::CandleClosed { candle })
        }
    }
}

// ─── Command routing ──────────────────────────────────────────────────────────

/// Resolve one inbound command. The returned event goes back to the
/// requesting session only.
async fn route_command(
    state: &SharedState,
    session_id: Uuid,
    symbol: &mut String,
    timeframe: &mut Timeframe,
    command: ClientCommand,
) -> WsEvent {
    match command {
        ClientCommand::Subscribe { symbol: s, timeframe: tf } => {
            *symbol = s.clone();
            *timeframe = tf;
            state.sessions.set_subscription(session_id, &s, tf);
            info!(session = %session_id, symbol = %s, timeframe = %tf, "subscription changed");
            WsEvent::Subscribed { symbol: s, timeframe: tf }
        }

        ClientCommand::StartTrading => set_strategy_enabled(state, true).await,
        ClientCommand::StopTrading => set_strategy_enabled(state, false).await,

        ClientCommand::PlaceOrder {
            symbol: order_symbol,
            side,
            volume,
            stop_loss_pips,
            take_profit_pips,
            comment,
        } => {
            let mut request = OrderRequest::new(
                side,
                &order_symbol,
                volume,
                comment.as_deref().unwrap_or("manual"),
            );
            request.stop_loss_pips = stop_loss_pips;
            request.take_profit_pips = take_profit_pips;
            request.reference_price = state.latest_market().tick.map(|t| match side {
                Side::Buy => t.ask,
                Side::Sell => t.bid,
            });

            let result = state.gate.admit(request).await;
            WsEvent::OrderResult { result }
        }

        ClientCommand::UpdateParameters(patch) => update_parameters(state, patch).await,
    }
}

/// Toggle the automated strategy. Shared with the REST start/stop routes.
pub(crate) async fn set_strategy_enabled(state: &SharedState, enabled: bool) -> WsEvent {
    let mut guard = state.params.write().await;
    let mut next = guard.clone();
    next.strategy_enabled = enabled;
    *guard = next;
    info!(enabled, "automated strategy toggled");
    WsEvent::TradingState {
        strategy_enabled: enabled,
    }
}

/// Validate and atomically publish a parameter update. Readers see the old
/// or the new full set, never a mix.
pub(crate) async fn update_parameters(state: &SharedState, patch: ParameterPatch) -> WsEvent {
    let mut guard = state.params.write().await;
    let next = guard.patched(&patch);
    match next.validate() {
        Ok(()) => {
            *guard = next.clone();
            info!(
                max_spread_pips = next.max_spread_pips,
                max_daily_trades = next.max_daily_trades,
                strategy_enabled = next.strategy_enabled,
                "trading parameters updated"
            );
            WsEvent::Parameters { parameters: next }
        }
        Err(message) => WsEvent::Error {
            message: format!("invalid parameters: {message}"),
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
