use crate::error::EngineError;
use crate::executor::TradeRunnersExecutor;
use crate::partition::OrderPartitionAggregator;
use crate::runner::{ConfigurationResult, RunContext};
use broker::{BrokerError, Orderer};
use chrono::{DateTime, Utc};
use core_types::{OpenOrder, TradeMaterial, TradeMode};
use std::sync::Arc;

/// What the Record stage needs from one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMaterial {
    pub time: DateTime<Utc>,
    /// Open orders as the broker reported them at the start of the tick.
    pub open_orders: Vec<OpenOrder>,
    /// Orders created or closed this tick, per configuration. Configurations
    /// that did nothing are left out.
    pub results: Vec<ConfigurationResult>,
}

/// Turns one priced snapshot into broker activity.
pub struct Trader {
    orderer: Arc<dyn Orderer>,
    partitions: OrderPartitionAggregator,
    executor: TradeRunnersExecutor,
}

impl Trader {
    pub fn new(
        orderer: Arc<dyn Orderer>,
        partitions: OrderPartitionAggregator,
        executor: TradeRunnersExecutor,
    ) -> Self {
        Self {
            orderer,
            partitions,
            executor,
        }
    }

    /// Handles one tick.
    ///
    /// Returns `None` when nothing should be recorded, either because the
    /// mode is `Watch` or because the broker could not list open orders.
    /// Errors are invariant violations only.
    pub async fn trade(
        &self,
        material: TradeMaterial,
        mode: TradeMode,
    ) -> Result<Option<RecordMaterial>, EngineError> {
        self.orderer.sync_price(&material).await?;
        if mode == TradeMode::Watch {
            return Ok(None);
        }

        let open_orders = match self.orderer.open_orders().await.wait().await {
            Ok(open_orders) => open_orders,
            Err(error) if error.is_fatal() || matches!(error, BrokerError::Disconnected) => {
                return Err(error.into());
            }
            Err(error) => {
                tracing::warn!(time = %material.time, %error, "could not list open orders; tick skipped");
                return Ok(None);
            }
        };

        let partitioned = self.partitions.partition(open_orders.clone()).await?;
        let context = RunContext {
            orderer: self.orderer.clone(),
            partitions: self.partitions.clone(),
            mode,
        };
        let time = material.time;
        let results = self
            .executor
            .execute(&context, Arc::new(material), partitioned)
            .await?
            .into_iter()
            .filter(|result| !result.is_empty())
            .collect();

        Ok(Some(RecordMaterial {
            time,
            open_orders,
            results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::{configuration, material_at, ScriptedStrategy};
    use crate::runner::TradeRunner;
    use broker::SimulationOrderer;
    use chrono::{FixedOffset, TimeZone};
    use core_types::{OrderId, SessionWindow, TradeDirection, TradePair};
    use rust_decimal_macros::dec;
    use strategies::OrderAction;

    fn trader(strategy: ScriptedStrategy) -> Trader {
        let (orderer, _) = SimulationOrderer::spawn(64);
        let (partitions, _) = OrderPartitionAggregator::spawn(64);
        let runner = TradeRunner::new(
            configuration(1, TradePair::GbpUsd, SessionWindow::TokyoAm),
            Box::new(strategy),
        );
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let executor = TradeRunnersExecutor::new(vec![runner], 0, offset).unwrap();
        Trader::new(Arc::new(orderer), partitions, executor)
    }

    fn tick(minute: u32) -> TradeMaterial {
        material_at(Utc.with_ymd_and_hms(2024, 1, 8, 0, minute, 0).unwrap())
    }

    #[tokio::test]
    async fn orders_created_on_one_tick_are_managed_on_the_next() {
        let trader = trader(ScriptedStrategy {
            open_actions: vec![OrderAction::Create {
                pair: TradePair::GbpUsd,
                units: dec!(1000),
                direction: TradeDirection::Long,
            }],
            manage_actions: vec![OrderAction::Close(OrderId(0))],
            ..Default::default()
        });

        let first = trader.trade(tick(0), TradeMode::Trade).await.unwrap().unwrap();
        assert!(first.open_orders.is_empty());
        assert_eq!(first.results.len(), 1);
        assert_eq!(first.results[0].created[0].order_id, OrderId(0));

        let second = trader.trade(tick(1), TradeMode::Trade).await.unwrap().unwrap();
        assert_eq!(second.open_orders.len(), 1);
        assert_eq!(second.results[0].closed[0].order_id, OrderId(0));

        let third = trader.trade(tick(2), TradeMode::Trade).await.unwrap().unwrap();
        assert!(third.open_orders.is_empty());
        assert_eq!(third.results[0].created[0].order_id, OrderId(1));
    }

    #[tokio::test]
    async fn watch_mode_records_nothing() {
        let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let trader = trader(ScriptedStrategy { calls: calls.clone(), ..Default::default() });
        assert!(trader.trade(tick(0), TradeMode::Watch).await.unwrap().is_none());
        assert!(calls.lock().unwrap().is_empty());

        let idle = trader.trade(tick(1), TradeMode::Trade).await.unwrap().unwrap();
        assert!(idle.results.is_empty());
        assert_eq!(*calls.lock().unwrap(), vec!["open"]);
    }
}
