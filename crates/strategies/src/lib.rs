//! # Tradeflow Strategy Library
//!
//! This crate contains the trading decision logic. It defines a universal
//! `Strategy` trait and provides the frame breakout implementation.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** strategies never talk to the broker. They read a
//!   `TradeMaterial` and return the `OrderAction`s they want; the engine
//!   issues and tracks the resulting orders.
//! - **Strategy Agnostic Engine:** By using the `Strategy` trait, the engine's
//!   executor can run any strategy without knowing its internal details.
//! - **Extensibility:** Adding a new strategy involves creating a new module,
//!   implementing the `Strategy` trait, and adding it to `AlgorithmKind` and
//!   the `factory`.
//!
//! ## Public API
//!
//! - `Strategy`: The core trait all strategies implement.
//! - `OrderAction`: what a strategy asks the broker to do.
//! - `create_strategy`: The factory function to construct a strategy instance.
//! - `FrameStrategy`: the frame breakout strategy.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod factory;
pub mod frame;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use factory::create_strategy;
pub use frame::FrameStrategy;

use core_types::{OpenOrder, OrderId, TradeDirection, TradeMaterial, TradePair};
use rust_decimal::Decimal;

/// A broker request produced by a strategy decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    Create {
        pair: TradePair,
        units: Decimal,
        direction: TradeDirection,
    },
    Close(OrderId),
}

/// The core trait that all trading strategies must implement.
///
/// Strategies are immutable after construction so one instance can be
/// evaluated from any worker. The `Send + Sync` bounds are required to move
/// them across the executor's worker tasks.
pub trait Strategy: Send + Sync {
    /// Decides whether to enter the market when the configuration holds no
    /// open orders.
    fn open(&self, material: &TradeMaterial, pair: TradePair) -> Result<Vec<OrderAction>, StrategyError>;

    /// Decides what to do with the configuration's open orders. May close
    /// them, add to them, or do nothing.
    fn manage(
        &self,
        material: &TradeMaterial,
        open_orders: &[OpenOrder],
        pair: TradePair,
    ) -> Result<Vec<OrderAction>, StrategyError>;
}
