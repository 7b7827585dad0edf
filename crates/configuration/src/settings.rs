use chrono::{FixedOffset, Offset, Utc};
use core_types::{TradeMode, TradePair};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub flow: FlowSettings,
    #[serde(default)]
    pub trade: TradeSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub oanda: OandaSettings,
}

/// Mailbox capacities and timers of the pipeline.
///
/// A full mailbox blocks its producer. There is no drop policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Capacity of each of the Price, Trade and Record stage mailboxes.
    pub stage_capacity: usize,
    /// Capacity of the order partition aggregator mailbox.
    pub partition_capacity: usize,
    /// Capacity of the simulated orderer mailbox.
    pub orderer_capacity: usize,
    /// Seconds between periodic ledger flushes.
    pub write_interval_secs: u64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            stage_capacity: 256,
            partition_capacity: 8192,
            orderer_capacity: 8192,
            write_interval_secs: 60,
        }
    }
}

impl FlowSettings {
    pub fn write_interval(&self) -> Duration {
        Duration::from_secs(self.write_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeSettings {
    /// Units per order handed to every strategy.
    pub units: Decimal,
    /// Number of concurrent worker groups per tick. 0 runs sequentially.
    pub parallel: usize,
    /// UTC offset, in hours, of the clock session windows are defined on.
    pub session_offset_hours: i32,
    pub initial_mode: TradeMode,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            units: dec!(1000),
            parallel: 0,
            session_offset_hours: 9,
            initial_mode: TradeMode::Trade,
        }
    }
}

impl TradeSettings {
    pub fn session_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.session_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

/// Parameters of the historical price replay.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub pairs: Vec<TradePair>,
    /// Broker granularity code of the replayed candles.
    pub granularity: String,
    /// Length of one candle in seconds; the simulated clock step.
    pub granularity_secs: i64,
    /// Candles visible to strategies on each tick.
    pub window_size: usize,
    /// Candles requested per history page.
    pub page_size: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            pairs: TradePair::ALL.to_vec(),
            granularity: "M1".to_string(),
            granularity_secs: 60,
            window_size: 250,
            page_size: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OandaSettings {
    pub host: String,
    pub token: String,
    /// Account to trade on. The first account of the token is used when unset.
    pub account_id: Option<String>,
}

impl Default for OandaSettings {
    fn default() -> Self {
        Self {
            host: "https://api-fxpractice.oanda.com".to_string(),
            token: String::new(),
            account_id: None,
        }
    }
}

/// Parameters for the frame breakout strategy.
///
/// Stored as JSON on each trade algorithm row. Missing fields fall back to
/// the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameParams {
    /// Candles in the short frame.
    pub small_frame_length: usize,
    /// Candles in the long frame.
    pub large_frame_length: usize,
    /// Minimum short frame range, in pips above the spread, before entering.
    pub pips_gap_for_create_order: Decimal,
    /// Close everything once the total drops below this.
    pub pips_for_stop_loss: Decimal,
    /// Add to the position when the latest order sinks below this.
    pub pips_for_additional_order: Decimal,
    pub time_for_profit_1: i64,
    pub time_for_profit_2: i64,
    pub time_for_profit_3: i64,
    pub pips_for_profit_1: Decimal,
    pub pips_for_profit_2: Decimal,
    pub pips_for_profit_3: Decimal,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            small_frame_length: 30,
            large_frame_length: 60,
            pips_gap_for_create_order: dec!(10),
            pips_for_stop_loss: dec!(-100),
            pips_for_additional_order: dec!(-5),
            time_for_profit_1: 40,
            time_for_profit_2: 60,
            time_for_profit_3: 80,
            pips_for_profit_1: dec!(20),
            pips_for_profit_2: dec!(10),
            pips_for_profit_3: dec!(5),
        }
    }
}

impl FrameParams {
    /// Reads the parameters stored on a trade algorithm row.
    pub fn from_json(params: &JsonValue) -> Result<Self, ConfigError> {
        let params: FrameParams = serde_json::from_value(params.clone())?;
        if params.small_frame_length == 0 || params.large_frame_length < params.small_frame_length
        {
            return Err(ConfigError::ValidationError(format!(
                "frame lengths must satisfy 0 < small ({}) <= large ({})",
                params.small_frame_length, params.large_frame_length
            )));
        }
        Ok(params)
    }
}
