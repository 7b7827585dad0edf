//! The Price → Trade → Record pipeline.
//!
//! Each stage is one task draining its own mailbox. Shutdown travels
//! downstream: a stage forwards the request, waits until its downstream
//! stage has exited, acknowledges, then exits itself.

mod price_stage;
mod record_stage;
mod trade_stage;

use crate::error::EngineError;
use crate::recorder::Recorder;
use crate::trader::Trader;
use configuration::FlowSettings;
use core_types::TradeMode;
use pricer::PriceSource;
use price_stage::PriceMessage;
use record_stage::RecordMessage;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use trade_stage::TradeMessage;

pub(crate) type Ack = oneshot::Sender<()>;

type ActorTask = JoinHandle<Result<(), EngineError>>;

/// A long-running collaborator the flow should watch for fatal exits.
pub struct SupervisedActor {
    name: &'static str,
    task: ActorTask,
}

/// Wraps an actor's task so the flow supervisor can watch it.
pub fn supervise<E>(name: &'static str, task: JoinHandle<Result<(), E>>) -> SupervisedActor
where
    E: Into<EngineError> + Send + 'static,
{
    let task = tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error.into()),
            Err(join) => Err(EngineError::Worker(join.to_string())),
        }
    });
    SupervisedActor { name, task }
}

/// Sends a shutdown request and waits until the receiving stage has exited.
/// A stage that already stopped counts as shut down.
pub(crate) async fn shutdown_downstream<M>(name: &'static str, tx: &mpsc::Sender<M>)
where
    M: From<Ack>,
{
    let (ack, done) = oneshot::channel();
    if tx.send(M::from(ack)).await.is_err() {
        tracing::debug!(stage = name, "downstream stage already stopped");
        return;
    }
    let _ = done.await;
}

/// Forwards the task's error, if any, to the supervisor as soon as it ends.
fn report_failure(
    name: String,
    task: ActorTask,
    fatal: mpsc::UnboundedSender<EngineError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = task
            .await
            .unwrap_or_else(|join| Err(EngineError::Worker(format!("{name}: {join}"))));
        match outcome {
            Ok(()) => tracing::debug!(task = %name, "task exited"),
            Err(error) => {
                tracing::error!(task = %name, %error, "task stopped by a fatal error");
                let _ = fatal.send(error);
            }
        }
    })
}

impl From<Ack> for PriceMessage {
    fn from(ack: Ack) -> Self {
        PriceMessage::Shutdown(ack)
    }
}

impl From<Ack> for TradeMessage {
    fn from(ack: Ack) -> Self {
        TradeMessage::Shutdown(ack)
    }
}

impl From<Ack> for RecordMessage {
    fn from(ack: Ack) -> Self {
        RecordMessage::Shutdown(ack)
    }
}

/// Everything a flow needs, fully built.
pub struct FlowSetup {
    pub price_source: Box<dyn PriceSource>,
    pub trader: Trader,
    pub recorder: Box<dyn Recorder>,
    pub settings: FlowSettings,
    pub initial_mode: TradeMode,
    /// Actor tasks whose failure must stop the run.
    pub actors: Vec<SupervisedActor>,
}

/// Controls a running flow from outside. Cheap to clone.
#[derive(Clone)]
pub struct FlowHandle {
    price: mpsc::Sender<PriceMessage>,
    trade: mpsc::Sender<TradeMessage>,
    done: watch::Receiver<bool>,
}

impl FlowHandle {
    /// Stops the flow and returns once all three stages have exited.
    pub async fn shutdown(&self) {
        shutdown_downstream("price", &self.price).await;
        self.stopped().await;
    }

    /// Takes effect from the next tick the Trade stage handles.
    pub async fn change_trade_mode(&self, mode: TradeMode) -> Result<(), EngineError> {
        self.trade
            .send(TradeMessage::ChangeMode(mode))
            .await
            .map_err(|_| EngineError::FlowStopped)
    }

    /// Resolves once every stage has exited.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.done.borrow()
    }
}

/// A started pipeline.
pub struct Flow {
    handle: FlowHandle,
    fatal: mpsc::UnboundedReceiver<EngineError>,
}

impl Flow {
    /// Spawns the three stages and the supervisor.
    pub fn start(setup: FlowSetup) -> Self {
        let capacity = setup.settings.stage_capacity.max(1);
        let (price_tx, price_rx) = mpsc::channel(capacity);
        let (trade_tx, trade_rx) = mpsc::channel(capacity);
        let (record_tx, record_rx) = mpsc::channel(capacity);
        let (done_tx, done_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let record = tokio::spawn(record_stage::run(
            setup.recorder,
            record_rx,
            setup.settings.write_interval(),
        ));
        let trade = tokio::spawn(trade_stage::run(
            setup.trader,
            setup.initial_mode,
            trade_rx,
            record_tx,
        ));
        let price = tokio::spawn(price_stage::run(
            setup.price_source,
            price_rx,
            trade_tx.clone(),
        ));

        for actor in setup.actors {
            report_failure(actor.name.to_string(), actor.task, fatal_tx.clone());
        }
        let stages = [("price", price), ("trade", trade), ("record", record)]
            .map(|(name, stage)| report_failure(format!("{name} stage"), stage, fatal_tx.clone()));
        tokio::spawn(async move {
            for stage in stages {
                let _ = stage.await;
            }
            tracing::info!("flow stopped");
            let _ = done_tx.send(true);
        });

        tracing::info!(capacity, "flow started");
        Self {
            handle: FlowHandle {
                price: price_tx,
                trade: trade_tx,
                done: done_rx,
            },
            fatal: fatal_rx,
        }
    }

    pub fn handle(&self) -> FlowHandle {
        self.handle.clone()
    }

    /// Waits until the flow stops on its own or by `shutdown`.
    ///
    /// Returns the first fatal error reported by a stage or a supervised
    /// actor. A fatal error is returned as soon as it is reported, without
    /// waiting for the remaining stages.
    pub async fn wait_for_completion(mut self) -> Result<(), EngineError> {
        let handle = self.handle.clone();
        tokio::select! {
            Some(error) = self.fatal.recv() => Err(error),
            _ = handle.stopped() => match self.fatal.try_recv() {
                Ok(error) => Err(error),
                Err(_) => Ok(()),
            },
        }
    }
}
