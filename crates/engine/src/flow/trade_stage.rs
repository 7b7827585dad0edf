use super::record_stage::RecordMessage;
use super::{shutdown_downstream, Ack};
use crate::error::EngineError;
use crate::trader::Trader;
use core_types::{TradeMaterial, TradeMode};
use tokio::sync::mpsc;

pub(crate) enum TradeMessage {
    Material(TradeMaterial),
    ChangeMode(TradeMode),
    Shutdown(Ack),
}

pub(crate) async fn run(
    trader: Trader,
    mut mode: TradeMode,
    mut mailbox: mpsc::Receiver<TradeMessage>,
    record: mpsc::Sender<RecordMessage>,
) -> Result<(), EngineError> {
    tracing::info!(mode = %mode, "trade stage started");

    while let Some(message) = mailbox.recv().await {
        match message {
            TradeMessage::Material(material) => match trader.trade(material, mode).await {
                Ok(Some(recorded)) => {
                    if record.send(RecordMessage::Record(recorded)).await.is_err() {
                        tracing::warn!("record stage stopped; trade stage exiting");
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(%error, "trade stage stopped by an invariant violation");
                    shutdown_downstream("record", &record).await;
                    return Err(error);
                }
            },
            TradeMessage::ChangeMode(next) => {
                tracing::info!(from = %mode, to = %next, "trade mode changed");
                mode = next;
            }
            TradeMessage::Shutdown(ack) => {
                tracing::info!("trade stage shutting down");
                shutdown_downstream("record", &record).await;
                let _ = ack.send(());
                return Ok(());
            }
        }
    }

    shutdown_downstream("record", &record).await;
    Ok(())
}
