use crate::error::EngineError;
use crate::partition::OrderPartitionAggregator;
use broker::{BrokerError, Completion, Orderer};
use core_types::{
    ClosedOrder, CreatedOrder, OpenOrder, OrderId, TradeConfiguration, TradeConfigurationKey,
    TradeMaterial, TradeMode,
};
use std::sync::Arc;
use strategies::{OrderAction, Strategy, StrategyError};

/// Orders one configuration created and closed during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationResult {
    pub key: TradeConfigurationKey,
    pub configuration_id: i64,
    pub created: Vec<CreatedOrder>,
    pub closed: Vec<ClosedOrder>,
}

impl ConfigurationResult {
    fn empty(runner: &TradeRunner) -> Self {
        Self {
            key: runner.key.clone(),
            configuration_id: runner.configuration.id,
            created: Vec::new(),
            closed: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.closed.is_empty()
    }
}

/// Shared collaborators every runner talks to during a tick.
#[derive(Clone)]
pub struct RunContext {
    pub orderer: Arc<dyn Orderer>,
    pub partitions: OrderPartitionAggregator,
    pub mode: TradeMode,
}

/// A trade configuration paired with its strategy instance.
pub struct TradeRunner {
    configuration: TradeConfiguration,
    key: TradeConfigurationKey,
    strategy: Box<dyn Strategy>,
}

impl TradeRunner {
    pub fn new(configuration: TradeConfiguration, strategy: Box<dyn Strategy>) -> Self {
        let key = configuration.key();
        Self {
            configuration,
            key,
            strategy,
        }
    }

    pub fn key(&self) -> &TradeConfigurationKey {
        &self.key
    }

    pub fn configuration(&self) -> &TradeConfiguration {
        &self.configuration
    }

    fn decide(&self, material: &TradeMaterial, owned: &[OpenOrder], mode: TradeMode) -> Result<Vec<OrderAction>, StrategyError> {
        let pair = self.configuration.pair;
        if owned.is_empty() {
            if mode == TradeMode::Terminate {
                return Ok(Vec::new());
            }
            return self.strategy.open(material, pair);
        }
        let actions = self.strategy.manage(material, owned, pair)?;
        if mode == TradeMode::Terminate {
            return Ok(actions
                .into_iter()
                .filter(|action| matches!(action, OrderAction::Close(_)))
                .collect());
        }
        Ok(actions)
    }

    /// Runs one decision and settles every broker call it issued.
    ///
    /// Created orders are registered with the partition aggregator and closed
    /// ones deregistered before this returns, so the next tick's partitioning
    /// already reflects them. Only invariant violations are returned as errors.
    pub async fn run(
        &self,
        context: &RunContext,
        material: &TradeMaterial,
        owned: &[OpenOrder],
    ) -> Result<ConfigurationResult, EngineError> {
        let mut result = ConfigurationResult::empty(self);

        let actions = match self.decide(material, owned, context.mode) {
            Ok(actions) => actions,
            Err(error) if error.is_fatal() => return Err(error.into()),
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "strategy skipped this tick");
                return Ok(result);
            }
        };
        if actions.is_empty() {
            return Ok(result);
        }

        let mut creates: Vec<Completion<CreatedOrder>> = Vec::new();
        let mut closes: Vec<(OrderId, Completion<ClosedOrder>)> = Vec::new();
        for action in actions {
            match action {
                OrderAction::Create { pair, units, direction } => {
                    creates.push(context.orderer.create_order(pair, units, direction).await);
                }
                OrderAction::Close(order_id) => {
                    closes.push((order_id, context.orderer.close_order(order_id).await));
                }
            }
        }

        for completion in creates {
            match completion.wait().await {
                Ok(created) => {
                    context.partitions.put(created.order_id, self.key.clone()).await?;
                    tracing::info!(key = %self.key, order_id = %created.order_id, price = %created.price_at_open, "order created");
                    result.created.push(created);
                }
                Err(error) => self.settle_failure("create", None, error)?,
            }
        }

        for (order_id, completion) in closes {
            match completion.wait().await {
                Ok(closed) => {
                    context.partitions.delete(closed.order_id).await?;
                    tracing::info!(key = %self.key, order_id = %closed.order_id, profit = %closed.realized_profit, "order closed");
                    result.closed.push(closed);
                }
                Err(error) => self.settle_failure("close", Some(order_id), error)?,
            }
        }

        Ok(result)
    }

    fn settle_failure(&self, call: &str, order_id: Option<OrderId>, error: BrokerError) -> Result<(), EngineError> {
        if error.is_fatal() || matches!(error, BrokerError::Disconnected) {
            tracing::error!(key = %self.key, call, ?order_id, %error, "broker invariant violated");
            return Err(error.into());
        }
        tracing::warn!(key = %self.key, call, ?order_id, %error, "broker call failed; order dropped");
        Ok(())
    }
}
