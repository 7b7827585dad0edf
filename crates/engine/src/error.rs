use broker::BrokerError;
use core_types::{OrderId, TradeConfigurationKey};
use database::DbError;
use pricer::PricerError;
use strategies::StrategyError;
use thiserror::Error;

/// Violations of the order ownership table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Order {order_id} is already owned by {owner}")]
    DuplicateOrderId {
        order_id: OrderId,
        owner: TradeConfigurationKey,
    },

    #[error("Order {0} has no owning configuration")]
    UnknownOrderId(OrderId),

    #[error("The partition aggregator has stopped")]
    Disconnected,
}

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Order {0} was recorded as created twice")]
    DuplicateCreatedOrder(OrderId),

    #[error("Order {0} was closed but never recorded as created")]
    UnknownClosedOrder(OrderId),

    #[error("Order {0} was recorded as closed twice")]
    DuplicateClosedOrder(OrderId),

    #[error("Ledger store error: {0}")]
    Store(#[from] DbError),
}

impl RecorderError {
    /// Store failures are retried on the next flush; everything else means
    /// the ledger no longer matches the broker.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RecorderError::Store(_))
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Price source error: {0}")]
    Pricer(#[from] PricerError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("The flow has already stopped")]
    FlowStopped,
}
