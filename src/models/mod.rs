//! Data model shared across the engine.

pub mod account;
pub mod candle;
pub mod instrument;
pub mod order;
pub mod params;
pub mod tick;

pub use account::AccountSnapshot;
pub use candle::{Candle, CandleBuilder, Timeframe};
pub use instrument::InstrumentSpec;
pub use order::{OrderRequest, OrderResult, Side};
pub use params::{ParameterPatch, TradingParameters};
pub use tick::TickSample;
