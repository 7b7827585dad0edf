use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred reading the trade material: {0}")]
    Material(#[from] CoreError),
}

impl StrategyError {
    /// A material without the configured pair means the pipeline is wired
    /// to the wrong price source. Too few candles is only a warm-up gap.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StrategyError::Material(CoreError::MissingInstrument(_)))
    }
}
