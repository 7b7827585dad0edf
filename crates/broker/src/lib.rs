//! # Tradeflow Broker Crate
//!
//! The order matching backend of the engine. A single capability contract,
//! `Orderer`, is implemented twice: once by a simulated matching engine
//! driven from historical prices, once by a live orderer talking to OANDA.
//!
//! ## Architectural Principles
//!
//! - **Issue, then await:** every operation returns a `Completion` handle as
//!   soon as the request is accepted. Callers may issue several requests and
//!   collect the results afterwards.
//! - **Composition over extension:** the simulated `MatchingEngine` owns the
//!   price, clock and open-order state as plain data. `SimulationOrderer`
//!   wraps it in an actor that serializes every request through one mailbox.
//!
//! ## Public API
//!
//! - `Orderer`: create / list / close orders.
//! - `SimulationOrderer`, `MatchingEngine`: the simulated backend.
//! - `LiveOrderer`: the OANDA backed implementation.
//! - `BrokerError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod live;
pub mod simulation;

pub use error::BrokerError;
pub use live::LiveOrderer;
pub use simulation::{MatchingEngine, SimulationOrderer};

use async_trait::async_trait;
use core_types::{ClosedOrder, CreatedOrder, OpenOrder, OrderId, TradeDirection, TradeMaterial, TradePair};
use rust_decimal::Decimal;
use tokio::sync::oneshot;

/// A pending broker result.
///
/// Resolves to `BrokerError::Disconnected` if the backend drops the request
/// without replying.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, BrokerError>>,
}

/// The sending half of a `Completion`.
pub type Responder<T> = oneshot::Sender<Result<T, BrokerError>>;

impl<T> Completion<T> {
    pub fn channel() -> (Responder<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A completion that is already resolved.
    pub fn ready(result: Result<T, BrokerError>) -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(result);
        completion
    }

    pub async fn wait(self) -> Result<T, BrokerError> {
        self.rx.await.unwrap_or(Err(BrokerError::Disconnected))
    }
}

/// The broker capability contract.
///
/// Issuing a request may wait for mailbox capacity; the result itself is
/// delivered through the returned `Completion`.
#[async_trait]
pub trait Orderer: Send + Sync {
    async fn create_order(
        &self,
        pair: TradePair,
        units: Decimal,
        direction: TradeDirection,
    ) -> Completion<CreatedOrder>;

    async fn open_orders(&self) -> Completion<Vec<OpenOrder>>;

    async fn close_order(&self, order_id: OrderId) -> Completion<ClosedOrder>;

    /// Hands the latest snapshot to backends that price orders themselves.
    async fn sync_price(&self, _material: &TradeMaterial) -> Result<(), BrokerError> {
        Ok(())
    }
}
