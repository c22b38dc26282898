//! # source::mock
//!
//! [`MockSource`] — deterministic synthetic data for tests and for
//! degraded-mode operation when no real source is reachable. Ticks follow
//! a seeded random walk, candles are generated backwards from now, and
//! every order is accepted with a synthetic ticket.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::Value;

use crate::error::SourceError;
use crate::models::{
    AccountSnapshot, Candle, InstrumentSpec, OrderRequest, OrderResult, TickSample, Timeframe,
};
use crate::source::BrokerSource;

const MOCK_BALANCE: f64 = 10_000.0;
const FIRST_TICKET: u64 = 100_000;

struct MockInner {
    rng: StdRng,
    price: f64,
    next_ticket: u64,
}

pub struct MockSource {
    symbol: String,
    instrument: InstrumentSpec,
    inner: Mutex<MockInner>,
}

impl MockSource {
    pub fn new(symbol: &str, instrument: InstrumentSpec, base_price: f64, seed: u64) -> Self {
        Self {
            symbol: symbol.to_string(),
            instrument,
            inner: Mutex::new(MockInner {
                rng: StdRng::seed_from_u64(seed),
                price: base_price,
                next_ticket: FIRST_TICKET,
            }),
        }
    }
}

#[async_trait]
impl BrokerSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn probe(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn account(&self) -> Result<AccountSnapshot, SourceError> {
        Ok(AccountSnapshot {
            login: Some(9_999),
            balance: MOCK_BALANCE,
            equity: MOCK_BALANCE,
            margin: 0.0,
            free_margin: MOCK_BALANCE,
            profit: 0.0,
            currency: "USD".to_string(),
            captured_at: Utc::now(),
        })
    }

    async fn tick(&self, symbol: &str) -> Result<TickSample, SourceError> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        let step: f64 = inner.rng.gen_range(-0.5..0.5);
        inner.price = (inner.price + step).max(1.0);
        let spread: f64 = inner.rng.gen_range(0.2..0.5);
        let bid = inner.price - spread / 2.0;
        Ok(TickSample {
            symbol: symbol.to_string(),
            bid,
            ask: bid + spread,
            captured_at: Utc::now(),
        })
    }

    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, SourceError> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        let now = Utc::now();
        let bucket = chrono::Duration::seconds(timeframe.bucket_secs());
        let mut price = inner.price;
        let mut bars = Vec::with_capacity(count);
        for i in (1..=count as i64).rev() {
            let open_time = timeframe.bucket_start(now - bucket * (i as i32));
            let open = price;
            let high = open + inner.rng.gen_range(0.0..2.0);
            let low = open - inner.rng.gen_range(0.0..2.0);
            let close = inner.rng.gen_range(low..=high);
            price = close;
            bars.push(Candle {
                symbol: symbol.to_string(),
                open_time,
                open,
                high,
                low,
                close,
                timeframe,
            });
        }
        Ok(bars)
    }

    async fn instrument(&self, symbol: &str) -> Result<InstrumentSpec, SourceError> {
        let mut spec = self.instrument.clone();
        spec.symbol = symbol.to_string();
        Ok(spec)
    }

    async fn submit_order(
        &self,
        request: &OrderRequest,
        entry_price: f64,
        _sl_price: f64,
        _tp_price: f64,
    ) -> Result<OrderResult, SourceError> {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        Ok(OrderResult::accepted(request.request_id, ticket, entry_price))
    }

    async fn submit_command(&self, name: &str, params: Value) -> Result<Value, SourceError> {
        Ok(serde_json::json!({ "ok": true, "command": name, "params": params }))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InstrumentSpec {
        InstrumentSpec {
            symbol: "XAUUSD".into(),
            point: 0.01,
            digits: 2,
            pip_size: 0.1,
            volume_min: 0.01,
            volume_max: 100.0,
            volume_step: 0.01,
            tick_value: 1.0,
        }
    }

    #[tokio::test]
    async fn ticks_are_always_coherent() {
        let source = MockSource::new("XAUUSD", spec(), 2_385.0, 7);
        for _ in 0..500 {
            let tick = source.tick("XAUUSD").await.unwrap();
            assert!(tick.ask >= tick.bid, "ask {} < bid {}", tick.ask, tick.bid);
            assert!(tick.bid > 0.0);
        }
    }

    #[tokio::test]
    async fn same_seed_same_walk() {
        let a = MockSource::new("XAUUSD", spec(), 2_385.0, 42);
        let b = MockSource::new("XAUUSD", spec(), 2_385.0, 42);
        for _ in 0..10 {
            let ta = a.tick("XAUUSD").await.unwrap();
            let tb = b.tick("XAUUSD").await.unwrap();
            assert_eq!(ta.bid, tb.bid);
            assert_eq!(ta.ask, tb.ask);
        }
    }

    #[tokio::test]
    async fn orders_always_fill_with_unique_tickets() {
        let source = MockSource::new("XAUUSD", spec(), 2_385.0, 1);
        let request = OrderRequest::new(crate::models::Side::Buy, "XAUUSD", 0.01, "t");

        let first = source.submit_order(&request, 2385.9, 2380.9, 2395.9).await.unwrap();
        let second = source.submit_order(&request, 2385.9, 2380.9, 2395.9).await.unwrap();
        assert!(first.accepted && second.accepted);
        assert_ne!(first.ticket, second.ticket);
    }

    #[tokio::test]
    async fn candles_land_on_the_requested_grid() {
        let source = MockSource::new("XAUUSD", spec(), 2_385.0, 3);
        let bars = source.candles("XAUUSD", Timeframe::M5, 10).await.unwrap();
        assert_eq!(bars.len(), 10);
        for bar in &bars {
            assert_eq!(bar.open_time.timestamp() % 300, 0);
            assert!(bar.high >= bar.low);
        }
    }
}
