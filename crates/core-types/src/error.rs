use crate::enums::TradePair;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Trade material carries no candles for {0}")]
    MissingInstrument(TradePair),

    #[error("Frame of {required} candles requested for {pair} but only {available} are available")]
    InsufficientCandles {
        pair: TradePair,
        required: usize,
        available: usize,
    },
}
