//! # Tradeflow Core Types
//!
//! Shared vocabulary of the trading engine: instruments, session windows,
//! trade configurations, order records and the per-tick trade material.
//!
//! ## Public API
//!
//! - `TradePair`, `SessionWindow`: what is traded and when.
//! - `TradeConfiguration`, `TradeConfigurationKey`: the unit of partitioning.
//! - `CreatedOrder`, `OpenOrder`, `ClosedOrder`: broker results.
//! - `TradeMaterial`: the priced snapshot of one tick.

pub mod enums;
pub mod error;
pub mod material;
pub mod session;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{
    AlgorithmKind, OrderState, TradeDirection, TradeMode, TradePair, TradeRunState,
    TradeRunType, TradeSetType,
};
pub use error::CoreError;
pub use material::{CandleWindow, TradeMaterial};
pub use session::SessionWindow;
pub use structs::{
    profit_pips, Candle, ClosedOrder, CreatedOrder, Ohlc, OpenOrder, OrderId, Price,
    TradeAlgorithm, TradeConfiguration, TradeConfigurationKey, TradeRun, TradeSet,
    TradeSetDetail,
};
