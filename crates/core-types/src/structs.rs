use crate::enums::{
    AlgorithmKind, TradeDirection, TradePair, TradeRunState, TradeRunType, TradeSetType,
};
use crate::session::SessionWindow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Backend-assigned order identifier, unique for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top of book for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Price {
    pub fn new(bid: Decimal, ask: Decimal) -> Self {
        Self { bid, ask }
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Ohlc {
    pub fn flat(price: Decimal) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }
}

/// One bar of history carrying bid, ask and mid components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub bid: Ohlc,
    pub ask: Ohlc,
    pub mid: Ohlc,
}

/// Profit of a position in pips against a reference price.
///
/// Longs are valued at the bid, shorts at the ask.
pub fn profit_pips(
    pair: TradePair,
    direction: TradeDirection,
    price_at_open: Decimal,
    reference: &Price,
) -> Decimal {
    let diff = match direction {
        TradeDirection::Long => reference.bid - price_at_open,
        TradeDirection::Short => price_at_open - reference.ask,
    };
    diff / pair.pip_size()
}

/// The result of a successful create-order call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub pair: TradePair,
    pub direction: TradeDirection,
    pub units: Decimal,
    pub time_at_open: DateTime<Utc>,
    pub price_at_open: Decimal,
}

/// A position the broker still holds, valued at the latest price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order: CreatedOrder,
    pub unrealized_profit: Decimal,
}

impl OpenOrder {
    pub fn order_id(&self) -> OrderId {
        self.order.order_id
    }
}

/// The result of a successful close-order call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedOrder {
    pub order_id: OrderId,
    pub pair: TradePair,
    pub direction: TradeDirection,
    pub time_at_close: DateTime<Utc>,
    pub price_at_close: Decimal,
    pub realized_profit: Decimal,
}

/// Stable identity of a trade configuration: `pair-window-algorithmId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeConfigurationKey(String);

impl TradeConfigurationKey {
    pub fn new(pair: TradePair, window: SessionWindow, algorithm_id: i64) -> Self {
        Self(format!("{}-{}-{}", pair, window, algorithm_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeConfigurationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored strategy definition: type, parameters and direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAlgorithm {
    pub id: i64,
    pub kind: AlgorithmKind,
    pub params: JsonValue,
    pub direction: TradeDirection,
}

/// The unit of partitioning and parallelism. Read-only during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeConfiguration {
    pub id: i64,
    pub pair: TradePair,
    pub window: SessionWindow,
    pub algorithm: TradeAlgorithm,
}

impl TradeConfiguration {
    pub fn key(&self) -> TradeConfigurationKey {
        TradeConfigurationKey::new(self.pair, self.window, self.algorithm.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSet {
    pub id: i64,
    pub name: String,
    pub version: i32,
    pub set_type: TradeSetType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSetDetail {
    pub trade_set: TradeSet,
    pub configurations: Vec<TradeConfiguration>,
}

/// One execution of a trade set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRun {
    pub id: i64,
    pub trade_set_id: i64,
    pub run_type: TradeRunType,
    pub state: TradeRunState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_round_trip_earns_fifty_pips() {
        let open = Price::new(dec!(1.3000), dec!(1.3002));
        let close = Price::new(dec!(1.3050), dec!(1.3052));
        let profit = profit_pips(TradePair::GbpUsd, TradeDirection::Long, open.ask, &close);
        // Opened at the ask of 1.3002, valued at the bid of 1.3050.
        assert_eq!(profit, dec!(48));
        let from_bid = profit_pips(TradePair::GbpUsd, TradeDirection::Long, open.bid, &close);
        assert_eq!(from_bid, dec!(50));
    }

    #[test]
    fn short_is_valued_at_the_ask() {
        let reference = Price::new(dec!(150.00), dec!(150.02));
        let profit = profit_pips(TradePair::UsdJpy, TradeDirection::Short, dec!(150.50), &reference);
        assert_eq!(profit, dec!(48));
    }

    #[test]
    fn configuration_key_joins_component_ids() {
        let key = TradeConfigurationKey::new(TradePair::GbpUsd, SessionWindow::LondonAm, 7);
        assert_eq!(key.as_str(), "GBP/USD-london_am-7");
    }
}
