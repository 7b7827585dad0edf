use crate::error::CoreError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tradable currency pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TradePair {
    #[serde(rename = "GBP/USD")]
    GbpUsd,
    #[serde(rename = "EUR/USD")]
    EurUsd,
    #[serde(rename = "AUD/USD")]
    AudUsd,
    #[serde(rename = "AUD/JPY")]
    AudJpy,
    #[serde(rename = "GBP/AUD")]
    GbpAud,
    #[serde(rename = "EUR/AUD")]
    EurAud,
    #[serde(rename = "USD/JPY")]
    UsdJpy,
    #[serde(rename = "GBP/JPY")]
    GbpJpy,
    #[serde(rename = "EUR/JPY")]
    EurJpy,
    #[serde(rename = "EUR/GBP")]
    EurGbp,
}

impl TradePair {
    pub const ALL: [TradePair; 10] = [
        TradePair::GbpUsd,
        TradePair::EurUsd,
        TradePair::AudUsd,
        TradePair::AudJpy,
        TradePair::GbpAud,
        TradePair::EurAud,
        TradePair::UsdJpy,
        TradePair::GbpJpy,
        TradePair::EurJpy,
        TradePair::EurGbp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradePair::GbpUsd => "GBP/USD",
            TradePair::EurUsd => "EUR/USD",
            TradePair::AudUsd => "AUD/USD",
            TradePair::AudJpy => "AUD/JPY",
            TradePair::GbpAud => "GBP/AUD",
            TradePair::EurAud => "EUR/AUD",
            TradePair::UsdJpy => "USD/JPY",
            TradePair::GbpJpy => "GBP/JPY",
            TradePair::EurJpy => "EUR/JPY",
            TradePair::EurGbp => "EUR/GBP",
        }
    }

    /// The smallest standard price increment. JPY-quoted pairs move in hundredths.
    pub fn pip_size(&self) -> Decimal {
        match self {
            TradePair::AudJpy | TradePair::UsdJpy | TradePair::GbpJpy | TradePair::EurJpy => {
                dec!(0.01)
            }
            _ => dec!(0.0001),
        }
    }

    /// The broker's instrument code, e.g. `GBP_USD`.
    pub fn instrument(&self) -> String {
        self.as_str().replace('/', "_")
    }

    pub fn from_instrument(instrument: &str) -> Result<Self, CoreError> {
        instrument.replace('_', "/").parse()
    }
}

impl fmt::Display for TradePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradePair {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradePair::ALL
            .into_iter()
            .find(|pair| pair.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::InvalidInput("trade pair".to_string(), s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Long => "long",
            TradeDirection::Short => "short",
        }
    }

    /// Direction implied by the sign of a signed unit count.
    pub fn from_units(units: Decimal) -> Self {
        if units.is_sign_negative() {
            TradeDirection::Short
        } else {
            TradeDirection::Long
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, TradeDirection::Long)
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(TradeDirection::Long),
            "short" => Ok(TradeDirection::Short),
            other => Err(CoreError::InvalidInput("trade direction".to_string(), other.to_string())),
        }
    }
}

/// Controls what the trade stage is allowed to do with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    /// Observe prices only. No broker calls.
    Watch,
    #[default]
    Trade,
    /// Manage existing positions, never open new ones.
    Terminate,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Watch => "watch",
            TradeMode::Trade => "trade",
            TradeMode::Terminate => "terminate",
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watch" => Ok(TradeMode::Watch),
            "trade" => Ok(TradeMode::Trade),
            "terminate" => Ok(TradeMode::Terminate),
            other => Err(CoreError::InvalidInput("trade mode".to_string(), other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeRunState {
    Pending,
    Running,
    Finished,
}

impl TradeRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeRunState::Pending => "pending",
            TradeRunState::Running => "running",
            TradeRunState::Finished => "finished",
        }
    }
}

impl FromStr for TradeRunState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TradeRunState::Pending),
            "running" => Ok(TradeRunState::Running),
            "finished" => Ok(TradeRunState::Finished),
            other => Err(CoreError::InvalidInput("trade run state".to_string(), other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeRunType {
    OandaSimulation,
    OandaTrade,
}

impl TradeRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeRunType::OandaSimulation => "oanda_simulation",
            TradeRunType::OandaTrade => "oanda_trade",
        }
    }
}

impl FromStr for TradeRunType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oanda_simulation" => Ok(TradeRunType::OandaSimulation),
            "oanda_trade" => Ok(TradeRunType::OandaTrade),
            other => Err(CoreError::InvalidInput("trade run type".to_string(), other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSetType {
    Trade,
    Simulation,
}

impl TradeSetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSetType::Trade => "trade",
            TradeSetType::Simulation => "simulation",
        }
    }
}

impl FromStr for TradeSetType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trade" => Ok(TradeSetType::Trade),
            "simulation" => Ok(TradeSetType::Simulation),
            other => Err(CoreError::InvalidInput("trade set type".to_string(), other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Open,
    Closed,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Open => "open",
            OrderState::Closed => "closed",
        }
    }
}

/// Identifies which strategy implementation a trade algorithm row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Frame,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Frame => "frame",
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frame" => Ok(AlgorithmKind::Frame),
            other => Err(CoreError::InvalidInput("algorithm type".to_string(), other.to_string())),
        }
    }
}
