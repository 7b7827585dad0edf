use crate::error::EngineError;
use crate::partition::Partitioned;
use crate::runner::{ConfigurationResult, RunContext, TradeRunner};
use chrono::FixedOffset;
use core_types::{OpenOrder, SessionWindow, TradeConfigurationKey, TradeMaterial};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

/// Splits `items` into at most `parallel` groups of near-equal size.
///
/// The first `len % n` groups take one extra item. `parallel == 0` yields a
/// single group.
pub fn split_into_groups<T>(items: Vec<T>, parallel: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let groups = parallel.clamp(1, items.len());
    let base = items.len() / groups;
    let remainder = items.len() % groups;

    let mut items = items.into_iter();
    (0..groups)
        .map(|index| {
            let size = base + usize::from(index < remainder);
            items.by_ref().take(size).collect()
        })
        .collect()
}

type Assignment = (Arc<TradeRunner>, Vec<OpenOrder>);

/// Runs every eligible configuration once per tick.
///
/// A configuration is eligible when its session window is the one active at
/// the tick, or when it owns open orders in any window.
pub struct TradeRunnersExecutor {
    runners: Vec<Arc<TradeRunner>>,
    index: HashMap<TradeConfigurationKey, usize>,
    parallel: usize,
    session_offset: FixedOffset,
}

impl TradeRunnersExecutor {
    pub fn new(
        runners: Vec<TradeRunner>,
        parallel: usize,
        session_offset: FixedOffset,
    ) -> Result<Self, EngineError> {
        let mut index = HashMap::with_capacity(runners.len());
        for (position, runner) in runners.iter().enumerate() {
            if index.insert(runner.key().clone(), position).is_some() {
                return Err(EngineError::Configuration(format!(
                    "trade configuration {} appears twice",
                    runner.key()
                )));
            }
        }
        Ok(Self {
            runners: runners.into_iter().map(Arc::new).collect(),
            index,
            parallel,
            session_offset,
        })
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Picks this tick's runners, in configuration order, with the orders
    /// each one owns.
    fn select(&self, material: &TradeMaterial, mut partitioned: Partitioned) -> Result<Vec<Assignment>, EngineError> {
        let window = SessionWindow::at(material.time, self.session_offset);

        if let Some(key) = partitioned.keys().find(|key| !self.index.contains_key(*key)) {
            return Err(EngineError::Invariant(format!(
                "open orders are owned by unknown configuration {key}"
            )));
        }

        let selected = self
            .runners
            .iter()
            .filter_map(|runner| {
                let owned = partitioned.remove(runner.key());
                let in_window = Some(runner.configuration().window) == window;
                match owned {
                    Some(orders) => Some((runner.clone(), orders)),
                    None if in_window => Some((runner.clone(), Vec::new())),
                    None => None,
                }
            })
            .collect();
        Ok(selected)
    }

    /// Evaluates the tick and returns one result per selected configuration,
    /// in configuration order.
    pub async fn execute(
        &self,
        context: &RunContext,
        material: Arc<TradeMaterial>,
        partitioned: Partitioned,
    ) -> Result<Vec<ConfigurationResult>, EngineError> {
        let selected = self.select(&material, partitioned)?;
        if selected.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(time = %material.time, configurations = selected.len(), "executing trade runners");

        if self.parallel == 0 {
            return run_group(context.clone(), material, selected).await;
        }

        let workers = split_into_groups(selected, self.parallel)
            .into_iter()
            .map(|group| tokio::spawn(run_group(context.clone(), material.clone(), group)));

        let mut results = Vec::new();
        for joined in join_all(workers).await {
            let group = joined.map_err(|e| EngineError::Worker(e.to_string()))?;
            results.extend(group?);
        }
        Ok(results)
    }
}

async fn run_group(
    context: RunContext,
    material: Arc<TradeMaterial>,
    group: Vec<Assignment>,
) -> Result<Vec<ConfigurationResult>, EngineError> {
    let mut results = Vec::with_capacity(group.len());
    for (runner, owned) in group {
        results.push(runner.run(&context, &material, &owned).await?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::OrderPartitionAggregator;
    use crate::runner::tests::{configuration, material_at, ScriptedStrategy};
    use broker::{Orderer, SimulationOrderer};
    use chrono::{TimeZone, Utc};
    use core_types::{CreatedOrder, OrderId, TradeDirection, TradeMode, TradePair};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[test]
    fn groups_put_the_remainder_first() {
        let groups = split_into_groups((0..10).collect::<Vec<_>>(), 3);
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        let flat: Vec<i32> = groups.into_iter().flatten().collect();
        assert_eq!(flat, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn groups_never_outnumber_items() {
        let sizes: Vec<usize> = split_into_groups(vec![1, 2], 8).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 1]);
        assert_eq!(split_into_groups(vec![1, 2, 3], 0), vec![vec![1, 2, 3]]);
        assert!(split_into_groups(Vec::<u8>::new(), 4).is_empty());
    }

    fn owned_order(id: u64) -> OpenOrder {
        OpenOrder {
            order: CreatedOrder {
                order_id: OrderId(id),
                pair: TradePair::EurUsd,
                direction: TradeDirection::Long,
                units: dec!(1000),
                time_at_open: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
                price_at_open: dec!(1.1000),
            },
            unrealized_profit: Decimal::ZERO,
        }
    }

    struct Fixture {
        executor: TradeRunnersExecutor,
        context: RunContext,
        tokyo_calls: Arc<Mutex<Vec<&'static str>>>,
        london_calls: Arc<Mutex<Vec<&'static str>>>,
    }

    async fn fixture(parallel: usize) -> Fixture {
        let tokyo_calls = Arc::new(Mutex::new(Vec::new()));
        let london_calls = Arc::new(Mutex::new(Vec::new()));
        let runners = vec![
            TradeRunner::new(
                configuration(1, TradePair::GbpUsd, SessionWindow::TokyoAm),
                Box::new(ScriptedStrategy { calls: tokyo_calls.clone(), ..Default::default() }),
            ),
            TradeRunner::new(
                configuration(2, TradePair::EurUsd, SessionWindow::LondonAm),
                Box::new(ScriptedStrategy { calls: london_calls.clone(), ..Default::default() }),
            ),
        ];
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let executor = TradeRunnersExecutor::new(runners, parallel, offset).unwrap();

        let (orderer, _) = SimulationOrderer::spawn(16);
        let (partitions, _) = OrderPartitionAggregator::spawn(16);
        let context = RunContext { orderer: Arc::new(orderer) as Arc<dyn Orderer>, partitions, mode: TradeMode::Trade };
        Fixture { executor, context, tokyo_calls, london_calls }
    }

    // 00:30 UTC on a Monday is 09:30 in Tokyo.
    fn tokyo_morning() -> Arc<TradeMaterial> {
        Arc::new(material_at(Utc.with_ymd_and_hms(2024, 1, 8, 0, 30, 0).unwrap()))
    }

    #[tokio::test]
    async fn only_the_active_window_opens() {
        let f = fixture(0).await;
        let results = f.executor.execute(&f.context, tokyo_morning(), Partitioned::new()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].configuration_id, 1);
        assert_eq!(*f.tokyo_calls.lock().unwrap(), vec!["open"]);
        assert!(f.london_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn owners_are_managed_outside_their_window() {
        let f = fixture(2).await;
        let london_key = f.executor.runners[1].key().clone();
        let partitioned = Partitioned::from([(london_key, vec![owned_order(0)])]);

        let results = f.executor.execute(&f.context, tokyo_morning(), partitioned).await.unwrap();

        let ids: Vec<i64> = results.iter().map(|r| r.configuration_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(*f.tokyo_calls.lock().unwrap(), vec!["open"]);
        assert_eq!(*f.london_calls.lock().unwrap(), vec!["manage"]);
    }

    #[tokio::test]
    async fn outside_every_window_only_owners_run() {
        let f = fixture(0).await;
        // Saturday 12:00 in Tokyo.
        let weekend = Arc::new(material_at(Utc.with_ymd_and_hms(2024, 1, 13, 3, 0, 0).unwrap()));
        let results = f.executor.execute(&f.context, weekend.clone(), Partitioned::new()).await.unwrap();
        assert!(results.is_empty());

        let london_key = f.executor.runners[1].key().clone();
        let partitioned = Partitioned::from([(london_key, vec![owned_order(0)])]);
        let results = f.executor.execute(&f.context, weekend, partitioned).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(f.tokyo_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn orders_of_an_unknown_configuration_are_fatal() {
        let f = fixture(0).await;
        let stranger = TradeConfigurationKey::new(TradePair::UsdJpy, SessionWindow::TokyoAm, 99);
        let partitioned = Partitioned::from([(stranger, vec![owned_order(0)])]);
        let outcome = f.executor.execute(&f.context, tokyo_morning(), partitioned).await;
        assert!(matches!(outcome, Err(EngineError::Invariant(_))));
    }

    #[test]
    fn duplicate_configurations_are_rejected() {
        let runners = vec![
            TradeRunner::new(configuration(1, TradePair::GbpUsd, SessionWindow::TokyoAm), Box::new(ScriptedStrategy::default())),
            TradeRunner::new(configuration(1, TradePair::GbpUsd, SessionWindow::TokyoAm), Box::new(ScriptedStrategy::default())),
        ];
        let offset = FixedOffset::east_opt(0).unwrap();
        assert!(matches!(
            TradeRunnersExecutor::new(runners, 0, offset),
            Err(EngineError::Configuration(_))
        ));
    }
}
