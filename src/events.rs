//! # events
//!
//! Wire messages of the client stream, plus [`StreamUpdate`], the internal
//! payload the hub broadcasts to session tasks.
//!
//! Outbound events serialize with a `type` tag so the dashboard can switch
//! on it; inbound commands deserialize from the same convention.

use serde::{Deserialize, Serialize};

use crate::freshness::ConnectivityState;
use crate::models::{
    AccountSnapshot, Candle, OrderResult, ParameterPatch, Side, TickSample, Timeframe,
    TradingParameters,
};

// ─── StreamUpdate (hub → session tasks) ───────────────────────────────────────

/// One hub broadcast. Session tasks filter by their subscription scope and
/// translate into [`WsEvent`]s at the socket edge.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    Market {
        account: Option<AccountSnapshot>,
        tick: Option<TickSample>,
        state: ConnectivityState,
    },
    CandleClosed {
        candle: Candle,
    },
}

// ─── WsEvent (server → client) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    /// Periodic market/account push, annotated with connectivity state.
    AccountStatus {
        account: Option<AccountSnapshot>,
        tick: Option<TickSample>,
        state: ConnectivityState,
    },

    /// A bar on the session's subscribed timeframe closed.
    CandleClosed { candle: Candle },

    /// Outcome of an order this session placed. Sent only to the
    /// requesting session, never broadcast.
    OrderResult {
        #[serde(flatten)]
        result: OrderResult,
    },

    /// Full parameter set after a successful update.
    Parameters { parameters: TradingParameters },

    /// Automated strategy toggled.
    TradingState { strategy_enabled: bool },

    /// Subscription acknowledged.
    Subscribed { symbol: String, timeframe: Timeframe },

    Error { message: String },
}

impl WsEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"serialization_error"}"#.to_string())
    }
}

// ─── ClientCommand (client → server) ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Subscribe {
        symbol: String,
        timeframe: Timeframe,
    },
    StartTrading,
    StopTrading,
    PlaceOrder {
        symbol: String,
        side: Side,
        volume: f64,
        #[serde(default)]
        stop_loss_pips: Option<f64>,
        #[serde(default)]
        take_profit_pips: Option<f64>,
        #[serde(default)]
        comment: Option<String>,
    },
    UpdateParameters(ParameterPatch),
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn outbound_events_carry_type_tags() {
        let event = WsEvent::AccountStatus {
            account: None,
            tick: Some(TickSample {
                symbol: "XAUUSD".into(),
                bid: 2385.4,
                ask: 2385.9,
                captured_at: Utc::now(),
            }),
            state: ConnectivityState::Connected,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "account_status");
        assert_eq!(value["state"], "CONNECTED");
        assert_eq!(value["tick"]["bid"], 2385.4);
    }

    #[test]
    fn inbound_commands_parse_from_tagged_json() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"subscribe","symbol":"XAUUSD","timeframe":"M5"}"#,
        )
        .unwrap();
        assert!(matches!(
            cmd,
            ClientCommand::Subscribe { ref symbol, timeframe: Timeframe::M5 } if symbol == "XAUUSD"
        ));

        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"place_order","symbol":"XAUUSD","side":"BUY","volume":0.02}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::PlaceOrder { side, volume, stop_loss_pips, .. } => {
                assert_eq!(side, Side::Buy);
                assert_eq!(volume, 0.02);
                assert!(stop_loss_pips.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"update_parameters","max_spread_pips":8.0,"strategy_enabled":true}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::UpdateParameters(patch) => {
                assert_eq!(patch.max_spread_pips, Some(8.0));
                assert_eq!(patch.strategy_enabled, Some(true));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn order_result_flattens_into_the_event() {
        let result = OrderResult::accepted(uuid::Uuid::new_v4(), 123_456, 2385.9);
        let event = WsEvent::OrderResult { result };
        let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(value["type"], "order_result");
        assert_eq!(value["accepted"], true);
        assert_eq!(value["ticket"], 123_456);
    }
}
