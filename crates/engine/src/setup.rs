use crate::error::EngineError;
use crate::executor::TradeRunnersExecutor;
use crate::flow::{supervise, Flow, FlowSetup, SupervisedActor};
use crate::partition::OrderPartitionAggregator;
use crate::recorder::Recorder;
use crate::runner::TradeRunner;
use crate::trader::Trader;
use broker::{Orderer, SimulationOrderer};
use configuration::{FlowSettings, TradeSettings};
use core_types::TradeConfiguration;
use pricer::PriceSource;
use std::sync::Arc;
use strategies::create_strategy;

/// Inputs of `build_trader`.
pub struct TraderSetup {
    pub configurations: Vec<TradeConfiguration>,
    pub trade: TradeSettings,
    pub orderer: Arc<dyn Orderer>,
    pub partition_capacity: usize,
}

/// Creates one strategy per configuration and wires them to the broker and
/// a fresh partition aggregator.
///
/// Must be called inside a Tokio runtime. The returned actor is the
/// aggregator's task.
pub fn build_trader(setup: TraderSetup) -> Result<(Trader, SupervisedActor), EngineError> {
    let runners = setup
        .configurations
        .into_iter()
        .map(|configuration| -> Result<TradeRunner, EngineError> {
            let strategy = create_strategy(&configuration.algorithm, setup.trade.units)?;
            Ok(TradeRunner::new(configuration, strategy))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let executor = TradeRunnersExecutor::new(
        runners,
        setup.trade.parallel,
        setup.trade.session_offset(),
    )?;
    tracing::info!(
        configurations = executor.len(),
        parallel = setup.trade.parallel,
        "trader built"
    );

    let (partitions, task) = OrderPartitionAggregator::spawn(setup.partition_capacity.max(1));
    let trader = Trader::new(setup.orderer, partitions, executor);
    Ok((trader, supervise("partition aggregator", task)))
}

/// Inputs of `start_simulation`.
pub struct SimulationSetup {
    pub configurations: Vec<TradeConfiguration>,
    pub flow: FlowSettings,
    pub trade: TradeSettings,
    pub price_source: Box<dyn PriceSource>,
    pub recorder: Box<dyn Recorder>,
}

/// Starts a flow against the simulated matching engine.
pub fn start_simulation(setup: SimulationSetup) -> Result<Flow, EngineError> {
    let (orderer, orderer_task) = SimulationOrderer::spawn(setup.flow.orderer_capacity.max(1));
    let initial_mode = setup.trade.initial_mode;
    let (trader, partition_actor) = build_trader(TraderSetup {
        configurations: setup.configurations,
        trade: setup.trade,
        orderer: Arc::new(orderer),
        partition_capacity: setup.flow.partition_capacity,
    })?;

    Ok(Flow::start(FlowSetup {
        price_source: setup.price_source,
        trader,
        recorder: setup.recorder,
        settings: setup.flow,
        initial_mode,
        actors: vec![supervise("simulated orderer", orderer_task), partition_actor],
    }))
}
