use crate::error::ConfigError;

// Declare the modules that make up this crate.
#[cfg(feature = "clap")]
pub mod cli;
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
#[cfg(feature = "clap")]
pub use cli::TradeOverrides;
pub use settings::{
    Config, FlowSettings, FrameParams, OandaSettings, SimulationSettings, TradeSettings,
};

/// Loads the application configuration.
///
/// Reads `config.toml` from the working directory when present, then applies
/// environment overrides such as `TRADEFLOW__OANDA__TOKEN`. Every section has
/// defaults, so an empty environment still yields a usable configuration.
pub fn load_config() -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(config::Environment::with_prefix("TRADEFLOW").separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    validate(&config)?;

    Ok(config)
}

/// Checks cross-field constraints that deserialization cannot express.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if !(-23..=23).contains(&config.trade.session_offset_hours) {
        return Err(ConfigError::ValidationError(format!(
            "session_offset_hours must be within -23..=23, got {}",
            config.trade.session_offset_hours
        )));
    }
    if config.flow.stage_capacity == 0
        || config.flow.partition_capacity == 0
        || config.flow.orderer_capacity == 0
    {
        return Err(ConfigError::ValidationError(
            "mailbox capacities must be positive".to_string(),
        ));
    }
    if config.simulation.window_size == 0
        || config.simulation.page_size == 0
        || config.simulation.granularity_secs <= 0
    {
        return Err(ConfigError::ValidationError(
            "simulation window, page size and granularity must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.flow.stage_capacity, 256);
        assert_eq!(config.simulation.window_size, 250);
    }

    #[test]
    fn rejects_out_of_range_session_offset() {
        let mut config = Config::default();
        config.trade.session_offset_hours = 30;
        assert!(matches!(validate(&config), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn rejects_empty_history_pages() {
        let mut config = Config::default();
        config.simulation.page_size = 0;
        assert!(matches!(validate(&config), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn frame_params_fill_missing_fields_from_defaults() {
        let params: FrameParams =
            serde_json::from_value(serde_json::json!({ "small_frame_length": 10 })).unwrap();
        assert_eq!(params.small_frame_length, 10);
        assert_eq!(params.large_frame_length, 60);
    }

    #[test]
    fn stored_frame_params_are_checked() {
        let inverted = serde_json::json!({ "small_frame_length": 90, "large_frame_length": 60 });
        assert!(matches!(
            FrameParams::from_json(&inverted),
            Err(ConfigError::ValidationError(_))
        ));
        let garbled = serde_json::json!({ "small_frame_length": "many" });
        assert!(matches!(FrameParams::from_json(&garbled), Err(ConfigError::ParamsError(_))));
    }
}
