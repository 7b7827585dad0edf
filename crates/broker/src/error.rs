use api_client::error::ApiError;
use core_types::{CoreError, OrderId, TradePair};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Order {0} is not open")]
    UnknownOrder(OrderId),

    #[error("No price has been synced for {0}")]
    MissingPrice(TradePair),

    #[error("Simulated orderer halted: {0}")]
    Halted(String),

    #[error("The orderer stopped before replying")]
    Disconnected,

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Unexpected broker response: {0}")]
    InvalidResponse(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl BrokerError {
    /// Invariant violations. The caller must stop rather than continue with
    /// state that disagrees with the broker.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BrokerError::UnknownOrder(_) | BrokerError::MissingPrice(_) | BrokerError::Halted(_)
        )
    }
}
