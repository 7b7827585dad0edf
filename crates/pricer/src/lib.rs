//! # Tradeflow Pricer Crate
//!
//! Price sources feed the pipeline one `TradeMaterial` per tick.
//!
//! ## Public API
//!
//! - `PriceSource`: the contract the Price stage drives.
//! - `SimulationPriceSource`: replays downloaded history on a simulated clock.
//! - `PricerError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod simulation;

pub use error::PricerError;
pub use simulation::SimulationPriceSource;

use async_trait::async_trait;
use core_types::TradeMaterial;

/// A lazy, finite or infinite sequence of priced snapshots.
#[async_trait]
pub trait PriceSource: Send {
    /// Prepares the source. Called once, before the first `next_price`.
    async fn initialize(&mut self) -> Result<(), PricerError>;

    /// The next snapshot, or `None` once the source is exhausted.
    async fn next_price(&mut self) -> Result<Option<TradeMaterial>, PricerError>;
}
