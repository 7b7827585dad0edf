use crate::error::BrokerError;
use crate::{Completion, Orderer, Responder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    profit_pips, ClosedOrder, CreatedOrder, OpenOrder, OrderId, Price, TradeDirection,
    TradeMaterial, TradePair,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Matches orders against the latest synced prices.
///
/// Order ids start at 0 and are never reused. Longs open at the ask and
/// close at the bid; shorts the other way around.
#[derive(Debug, Default)]
pub struct MatchingEngine {
    prices: HashMap<TradePair, Price>,
    clock: DateTime<Utc>,
    next_order_id: u64,
    open: Vec<OpenOrder>,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the simulated clock and replaces the prices of every pair the
    /// material carries.
    pub fn update(&mut self, material: &TradeMaterial) {
        self.clock = material.time;
        self.prices.extend(material.prices());
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    fn price(&self, pair: TradePair) -> Result<Price, BrokerError> {
        self.prices
            .get(&pair)
            .copied()
            .ok_or(BrokerError::MissingPrice(pair))
    }

    pub fn create(
        &mut self,
        pair: TradePair,
        units: Decimal,
        direction: TradeDirection,
    ) -> Result<CreatedOrder, BrokerError> {
        let price = self.price(pair)?;
        let price_at_open = match direction {
            TradeDirection::Long => price.ask,
            TradeDirection::Short => price.bid,
        };

        let order_id = OrderId(self.next_order_id);
        self.next_order_id += 1;

        let created = CreatedOrder {
            order_id,
            pair,
            direction,
            units: units.abs(),
            time_at_open: self.clock,
            price_at_open,
        };
        self.open.push(OpenOrder {
            order: created.clone(),
            unrealized_profit: profit_pips(pair, direction, price_at_open, &price),
        });
        Ok(created)
    }

    /// Revalues every open order at the current prices.
    pub fn open_orders(&mut self) -> Result<Vec<OpenOrder>, BrokerError> {
        for open in &mut self.open {
            let order = &open.order;
            let price = self
                .prices
                .get(&order.pair)
                .ok_or(BrokerError::MissingPrice(order.pair))?;
            open.unrealized_profit =
                profit_pips(order.pair, order.direction, order.price_at_open, price);
        }
        Ok(self.open.clone())
    }

    pub fn close(&mut self, order_id: OrderId) -> Result<ClosedOrder, BrokerError> {
        let index = self
            .open
            .iter()
            .position(|open| open.order.order_id == order_id)
            .ok_or(BrokerError::UnknownOrder(order_id))?;
        let pair = self.open[index].order.pair;
        let price = self.price(pair)?;

        let order = self.open.remove(index).order;
        let price_at_close = match order.direction {
            TradeDirection::Long => price.bid,
            TradeDirection::Short => price.ask,
        };
        Ok(ClosedOrder {
            order_id,
            pair,
            direction: order.direction,
            time_at_close: self.clock,
            price_at_close,
            realized_profit: profit_pips(pair, order.direction, order.price_at_open, &price),
        })
    }
}

enum Command {
    Update(TradeMaterial),
    Create {
        pair: TradePair,
        units: Decimal,
        direction: TradeDirection,
        reply: Responder<CreatedOrder>,
    },
    OpenOrders {
        reply: Responder<Vec<OpenOrder>>,
    },
    Close {
        order_id: OrderId,
        reply: Responder<ClosedOrder>,
    },
}

/// Handle to the simulated orderer actor.
///
/// All requests, including price syncs, pass through one FIFO mailbox, so an
/// order always sees every price update issued before it.
#[derive(Clone)]
pub struct SimulationOrderer {
    tx: mpsc::Sender<Command>,
}

impl SimulationOrderer {
    /// Spawns the actor. The task ends with `Err` on an invariant violation,
    /// or with `Ok` once every handle has been dropped.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<Result<(), BrokerError>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run(MatchingEngine::new(), rx));
        (Self { tx }, task)
    }

    async fn submit<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> Completion<T> {
        let (reply, completion) = Completion::channel();
        if self.tx.send(build(reply)).await.is_err() {
            return Completion::ready(Err(BrokerError::Disconnected));
        }
        completion
    }
}

#[async_trait]
impl Orderer for SimulationOrderer {
    async fn create_order(
        &self,
        pair: TradePair,
        units: Decimal,
        direction: TradeDirection,
    ) -> Completion<CreatedOrder> {
        self.submit(|reply| Command::Create {
            pair,
            units,
            direction,
            reply,
        })
        .await
    }

    async fn open_orders(&self) -> Completion<Vec<OpenOrder>> {
        self.submit(|reply| Command::OpenOrders { reply }).await
    }

    async fn close_order(&self, order_id: OrderId) -> Completion<ClosedOrder> {
        self.submit(|reply| Command::Close { order_id, reply }).await
    }

    async fn sync_price(&self, material: &TradeMaterial) -> Result<(), BrokerError> {
        self.tx
            .send(Command::Update(material.clone()))
            .await
            .map_err(|_| BrokerError::Disconnected)
    }
}

async fn run(mut engine: MatchingEngine, mut rx: mpsc::Receiver<Command>) -> Result<(), BrokerError> {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Update(material) => engine.update(&material),
            Command::Create {
                pair,
                units,
                direction,
                reply,
            } => respond(reply, engine.create(pair, units, direction))?,
            Command::OpenOrders { reply } => respond(reply, engine.open_orders())?,
            Command::Close { order_id, reply } => respond(reply, engine.close(order_id))?,
        }
    }
    tracing::debug!("simulated orderer mailbox closed");
    Ok(())
}

/// Delivers a result. A fatal error is delivered too, then halts the actor.
fn respond<T>(reply: Responder<T>, result: Result<T, BrokerError>) -> Result<(), BrokerError> {
    match result {
        Err(error) if error.is_fatal() => {
            tracing::error!(%error, "simulated orderer invariant violated");
            let message = error.to_string();
            let _ = reply.send(Err(error));
            Err(BrokerError::Halted(message))
        }
        result => {
            let _ = reply.send(result);
            Ok(())
        }
    }
}
