use crate::error::PartitionError;
use core_types::{OpenOrder, OrderId, TradeConfigurationKey};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Open orders grouped by the configuration that owns them.
pub type Partitioned = HashMap<TradeConfigurationKey, Vec<OpenOrder>>;

/// Which configuration owns each open order id.
///
/// Every open id has exactly one entry. An id is inserted once and removed
/// only after its close succeeded.
#[derive(Debug, Default)]
pub struct PartitionMap {
    owners: HashMap<OrderId, TradeConfigurationKey>,
}

impl PartitionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn put(&mut self, order_id: OrderId, key: TradeConfigurationKey) -> Result<(), PartitionError> {
        if let Some(owner) = self.owners.get(&order_id) {
            return Err(PartitionError::DuplicateOrderId {
                order_id,
                owner: owner.clone(),
            });
        }
        self.owners.insert(order_id, key);
        Ok(())
    }

    pub fn delete(&mut self, order_id: OrderId) -> Result<TradeConfigurationKey, PartitionError> {
        self.owners
            .remove(&order_id)
            .ok_or(PartitionError::UnknownOrderId(order_id))
    }

    /// Groups `orders` by owner, keeping their relative order within each group.
    pub fn partition(&self, orders: Vec<OpenOrder>) -> Result<Partitioned, PartitionError> {
        let mut partitioned: Partitioned = HashMap::new();
        for open in orders {
            let key = self
                .owners
                .get(&open.order_id())
                .ok_or(PartitionError::UnknownOrderId(open.order_id()))?;
            partitioned.entry(key.clone()).or_default().push(open);
        }
        Ok(partitioned)
    }
}

enum Command {
    Put {
        order_id: OrderId,
        key: TradeConfigurationKey,
    },
    Delete {
        order_id: OrderId,
    },
    Partition {
        orders: Vec<OpenOrder>,
        reply: oneshot::Sender<Result<Partitioned, PartitionError>>,
    },
}

/// Handle to the order partition aggregator actor.
///
/// `put` and `delete` only enqueue; a violation stops the actor, and every
/// later request fails with `PartitionError::Disconnected`. Since all
/// requests share one mailbox, a `partition` always sees every `put` and
/// `delete` sent before it.
#[derive(Clone)]
pub struct OrderPartitionAggregator {
    tx: mpsc::Sender<Command>,
}

impl OrderPartitionAggregator {
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<Result<(), PartitionError>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run(PartitionMap::new(), rx));
        (Self { tx }, task)
    }

    pub async fn put(&self, order_id: OrderId, key: TradeConfigurationKey) -> Result<(), PartitionError> {
        self.send(Command::Put { order_id, key }).await
    }

    pub async fn delete(&self, order_id: OrderId) -> Result<(), PartitionError> {
        self.send(Command::Delete { order_id }).await
    }

    pub async fn partition(&self, orders: Vec<OpenOrder>) -> Result<Partitioned, PartitionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Partition { orders, reply }).await?;
        rx.await.unwrap_or(Err(PartitionError::Disconnected))
    }

    async fn send(&self, command: Command) -> Result<(), PartitionError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| PartitionError::Disconnected)
    }
}

async fn run(mut map: PartitionMap, mut rx: mpsc::Receiver<Command>) -> Result<(), PartitionError> {
    while let Some(command) = rx.recv().await {
        let outcome = match command {
            Command::Put { order_id, key } => map.put(order_id, key),
            Command::Delete { order_id } => map.delete(order_id).map(|_| ()),
            Command::Partition { orders, reply } => match map.partition(orders) {
                Ok(partitioned) => {
                    let _ = reply.send(Ok(partitioned));
                    Ok(())
                }
                Err(error) => {
                    let _ = reply.send(Err(error.clone()));
                    Err(error)
                }
            },
        };
        if let Err(error) = outcome {
            tracing::error!(%error, "order partition invariant violated");
            return Err(error);
        }
    }
    tracing::debug!(open = map.len(), "order partition mailbox closed");
    Ok(())
}
