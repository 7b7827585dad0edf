use crate::settings::Config;
use clap::Args;
use rust_decimal::Decimal;

/// Command-line overrides for the `[trade]` section.
#[derive(Debug, Clone, Default, Args)]
pub struct TradeOverrides {
    /// Concurrent worker groups per tick. 0 evaluates sequentially.
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Units per order.
    #[arg(long)]
    pub units: Option<Decimal>,

    /// UTC offset, in hours, of the session window clock.
    #[arg(long, allow_hyphen_values = true)]
    pub session_offset_hours: Option<i32>,
}

impl TradeOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(parallel) = self.parallel {
            config.trade.parallel = parallel;
        }
        if let Some(units) = self.units {
            config.trade.units = units;
        }
        if let Some(hours) = self.session_offset_hours {
            config.trade.session_offset_hours = hours;
        }
    }
}
