use crate::error::StrategyError;
use crate::frame::FrameStrategy;
use crate::Strategy;
use configuration::FrameParams;
use core_types::{AlgorithmKind, TradeAlgorithm};
use rust_decimal::Decimal;

/// Creates a new strategy instance from a stored trade algorithm.
///
/// `units` is the order size every created order will carry.
pub fn create_strategy(
    algorithm: &TradeAlgorithm,
    units: Decimal,
) -> Result<Box<dyn Strategy>, StrategyError> {
    // The compiler will error if a new AlgorithmKind is added but not handled here.
    match algorithm.kind {
        AlgorithmKind::Frame => {
            let params = FrameParams::from_json(&algorithm.params)
                .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
            Ok(Box::new(FrameStrategy::new(params, algorithm.direction, units)?))
        }
    }
}
