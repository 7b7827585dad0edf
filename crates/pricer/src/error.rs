use api_client::error::ApiError;
use core_types::TradePair;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricerError {
    #[error("Failed to fetch price history: {0}")]
    Api(#[from] ApiError),

    #[error("{pair} has {available} candles but a window needs {required}")]
    InsufficientHistory {
        pair: TradePair,
        available: usize,
        required: usize,
    },

    #[error("Price source used before initialization")]
    NotInitialized,
}

impl PricerError {
    /// Whether the source can no longer produce prices.
    ///
    /// API failures other than a bad client configuration are treated as
    /// transient; the caller may skip them and ask for the next price.
    pub fn is_fatal(&self) -> bool {
        match self {
            PricerError::Api(ApiError::Configuration(_)) => true,
            PricerError::Api(_) => false,
            PricerError::InsufficientHistory { .. } | PricerError::NotInitialized => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_hiccups_are_transient() {
        let throttled = PricerError::Api(ApiError::Oanda {
            status: 429,
            message: "rate limited".to_string(),
        });
        assert!(!throttled.is_fatal());
        assert!(!PricerError::Api(ApiError::InvalidData("empty mid".to_string())).is_fatal());
        assert!(PricerError::Api(ApiError::Configuration("no token".to_string())).is_fatal());
        assert!(PricerError::NotInitialized.is_fatal());
        assert!(PricerError::InsufficientHistory {
            pair: TradePair::EurUsd,
            available: 1,
            required: 3,
        }
        .is_fatal());
    }
}
