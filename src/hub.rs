//! # hub
//!
//! [`StreamHub`] — the single upstream reader. One dedicated task polls
//! the broker source on a fixed cadence (ticks every second by default,
//! account data slower), annotates every result with the connectivity
//! state and fans it out to all session tasks over a bounded broadcast
//! channel.
//!
//! Two rules keep the hub healthy under partial upstream failure:
//! - an in-flight fetch that overruns its deadline is abandoned and
//!   logged; the next scheduled iteration is never blocked by it
//! - delivery is best-effort per session: a slow consumer lags on its own
//!   receiver and drops its oldest buffered updates (last-value-wins), the
//!   hub itself never stalls and never grows memory unboundedly
//!
//! Individual fetch failures are swallowed here; the freshness monitor is
//! how consumers learn the source has gone quiet.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::events::StreamUpdate;
use crate::models::CandleBuilder;
use crate::state::SharedState;

pub struct StreamHub {
    state: SharedState,
    builders: Vec<CandleBuilder>,
}

impl StreamHub {
    pub fn new(state: SharedState) -> Self {
        let builders = state
            .settings
            .candle_timeframes
            .iter()
            .map(|tf| CandleBuilder::new(&state.settings.symbol, *tf))
            .collect();
        Self { state, builders }
    }

    /// Spawn the poll loop on its own task.
    pub fn spawn(state: SharedState) -> JoinHandle<()> {
        tokio::spawn(Self::new(state).run())
    }

    async fn run(mut self) {
        let settings = self.state.settings.clone();
        info!(
            symbol = %settings.symbol,
            tick_interval_ms = settings.tick_interval.as_millis() as u64,
            "stream hub starting"
        );

        match timeout(settings.call_timeout, self.state.source.probe()).await {
            Ok(Ok(())) => self.state.freshness.mark_connecting(),
            Ok(Err(e)) => warn!(error = %e, "source probe failed"),
            Err(_) => warn!("source probe timed out"),
        }

        let mut ticker = interval(settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_account_poll = Instant::now();

        loop {
            ticker.tick().await;

            self.poll_tick_once().await;

            if Instant::now() >= next_account_poll {
                self.poll_account_once().await;
                next_account_poll = Instant::now() + settings.account_interval;
            }

            let market = self.state.latest_market();
            self.state.broadcast(StreamUpdate::Market {
                account: market.account,
                tick: market.tick,
                state: self.state.freshness.state(),
            });
        }
    }

    pub(crate) async fn poll_tick_once(&mut self) {
        let settings = self.state.settings.clone();
        match timeout(
            settings.call_timeout,
            self.state.source.tick(&settings.symbol),
        )
        .await
        {
            Err(_) => {
                warn!(
                    timeout_secs = settings.call_timeout.as_secs(),
                    "tick fetch abandoned, polling resumes"
                );
                self.state.freshness.record_failure(false);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "tick fetch failed");
                self.state.freshness.record_failure(e.is_fatal());
            }
            Ok(Ok(tick)) => {
                self.state.freshness.record_success();
                self.state.tick_count.fetch_add(1, Ordering::Relaxed);
                {
                    let mut market = self.state.last_market.write().expect("market snapshot poisoned");
                    market.tick = Some(tick.clone());
                }

                let mid = tick.mid();
                let closed: Vec<_> = self
                    .builders
                    .iter_mut()
                    .filter_map(|b| b.apply(mid, tick.captured_at))
                    .collect();
                for candle in closed {
                    debug!(timeframe = %candle.timeframe, close = candle.close, "candle closed");
                    self.state.broadcast(StreamUpdate::CandleClosed { candle });
                }
            }
        }
    }

    pub(crate) async fn poll_account_once(&mut self) {
        let settings = self.state.settings.clone();
        match timeout(settings.call_timeout, self.state.source.account()).await {
            Err(_) => {
                warn!(
                    timeout_secs = settings.call_timeout.as_secs(),
                    "account fetch abandoned, polling resumes"
                );
                self.state.freshness.record_failure(false);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "account fetch failed");
                self.state.freshness.record_failure(e.is_fatal());
            }
            Ok(Ok(snapshot)) => {
                self.state.freshness.record_success();
                self.state.update_count.fetch_add(1, Ordering::Relaxed);
                let mut market = self.state.last_market.write().expect("market snapshot poisoned");
                market.account = Some(snapshot);
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SourceMode};
    use crate::error::SourceError;
    use crate::freshness::ConnectivityState;
    use crate::models::{
        AccountSnapshot, Candle, InstrumentSpec, OrderRequest, OrderResult, TickSample, Timeframe,
    };
    use crate::source::{new_command_queue, BrokerSource};
    use crate::state::build_state;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn test_settings() -> Settings {
        Settings {
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
        }
    }

    /// Source that replays scripted ticks, then hangs forever.
    struct ScriptedSource {
        ticks: Mutex<VecDeque<TickSample>>,
    }

    impl ScriptedSource {
        fn new(ticks: Vec<TickSample>) -> Self {
            Self {
                ticks: Mutex::new(ticks.into()),
            }
        }
    }

    #[async_trait]
    impl BrokerSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn probe(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn account(&self) -> Result<AccountSnapshot, SourceError> {
            Err(SourceError::Unavailable("no account".into()))
        }
        async fn tick(&self, _symbol: &str) -> Result<TickSample, SourceError> {
            let next = self.ticks.lock().unwrap().pop_front();
            match next {
                Some(tick) => Ok(tick),
                // script exhausted: behave like a hung upstream
                None => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Err(SourceError::Unavailable("unreachable".into()))
                }
            }
        }
        async fn candles(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _count: usize,
        ) -> Result<Vec<Candle>, SourceError> {
            Err(SourceError::Unsupported("scripted"))
        }
        async fn instrument(&self, _symbol: &str) -> Result<InstrumentSpec, SourceError> {
            Err(SourceError::Unsupported("scripted"))
        }
        async fn submit_order(
            &self,
            _request: &OrderRequest,
            _entry_price: f64,
            _sl_price: f64,
            _tp_price: f64,
        ) -> Result<OrderResult, SourceError> {
            Err(SourceError::Unsupported("scripted"))
        }
        async fn submit_command(&self, _name: &str, _params: Value) -> Result<Value, SourceError> {
            Err(SourceError::Unsupported("scripted"))
        }
    }

    fn tick_at(secs: i64, bid: f64) -> TickSample {
        TickSample {
            symbol: "XAUUSD".into(),
            bid,
            ask: bid + 0.5,
            captured_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_fetch_is_abandoned_not_awaited() {
        let source = Arc::new(ScriptedSource::new(vec![]));
        let state = build_state(test_settings(), source, new_command_queue());
        let mut hub = StreamHub::new(state.clone());

        // the scripted source hangs for an hour; the poll must give up
        // after call_timeout and record a failure instead
        hub.poll_tick_once().await;
        assert_eq!(state.tick_count.load(Ordering::Relaxed), 0);
        assert_eq!(state.freshness.state(), ConnectivityState::Disconnected);
    }

    #[tokio::test]
    async fn successful_polls_update_market_and_freshness() {
        let source = Arc::new(ScriptedSource::new(vec![tick_at(0, 2385.4)]));
        let state = build_state(test_settings(), source, new_command_queue());
        let mut hub = StreamHub::new(state.clone());

        hub.poll_tick_once().await;
        assert_eq!(state.tick_count.load(Ordering::Relaxed), 1);
        assert_eq!(state.freshness.state(), ConnectivityState::Connected);
        assert_eq!(state.latest_market().tick.unwrap().bid, 2385.4);
    }

    #[tokio::test]
    async fn bucket_rollover_broadcasts_a_closed_candle() {
        // two ticks in one minute bucket, third in the next
        let source = Arc::new(ScriptedSource::new(vec![
            tick_at(0, 2385.0),
            tick_at(30, 2386.0),
            tick_at(61, 2387.0),
        ]));
        let state = build_state(test_settings(), source, new_command_queue());
        let mut rx = state.broadcast_tx.subscribe();
        let mut hub = StreamHub::new(state.clone());

        hub.poll_tick_once().await;
        hub.poll_tick_once().await;
        hub.poll_tick_once().await;

        let update = rx.recv().await.unwrap();
        match update {
            StreamUpdate::CandleClosed { candle } => {
                assert_eq!(candle.timeframe, Timeframe::M1);
                assert_eq!(candle.open, 2385.25); // mid of first tick
                assert_eq!(candle.close, 2386.25);
            }
            other => panic!("expected CandleClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_session_lags_without_blocking_the_sender() {
        let state = build_state(test_settings(), Arc::new(ScriptedSource::new(vec![])), new_command_queue());

        // a receiver that never drains, and a healthy one
        let mut stalled = state.broadcast_tx.subscribe();
        let mut healthy = state.broadcast_tx.subscribe();

        // push far more updates than the channel holds; send never blocks
        for i in 0..100 {
            state.broadcast(StreamUpdate::Market {
                account: None,
                tick: Some(tick_at(i, 2385.0 + i as f64)),
                state: ConnectivityState::Connected,
            });
            // the healthy session keeps consuming
            let _ = healthy.try_recv();
        }

        // the stalled session lost its oldest updates but resumes on the
        // newest still buffered, which is last-value-wins for its view
        match stalled.try_recv() {
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(skipped)) => {
                assert!(skipped >= 90);
            }
            other => panic!("expected Lagged, got {other:?}"),
        }
        let newest = loop {
            match stalled.try_recv() {
                Ok(update) => break update,
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(e) => panic!("unexpected {e:?}"),
            }
        };
        match newest {
            StreamUpdate::Market { tick: Some(tick), .. } => assert!(tick.bid >= 2477.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lag_error_is_distinguishable_from_close() {
        // RecvError::Lagged carries the skip count the session loop logs
        let (tx, mut rx) = tokio::sync::broadcast::channel(2);
        for i in 0..5 {
            tx.send(i).unwrap();
        }
        match rx.try_recv() {
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("unexpected {other:?}"),
        }
        drop(tx);
        // skipped values drained, then the close shows up
        let mut seen_closed = false;
        loop {
            match rx.try_recv() {
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::TryRecvError::Closed) => {
                    seen_closed = true;
                    break;
                }
                Err(e) => panic!("unexpected {e:?}"),
            }
        }
        assert!(seen_closed);
    }
}
