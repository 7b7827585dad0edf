use super::trade_stage::TradeMessage;
use super::{shutdown_downstream, Ack};
use crate::error::EngineError;
use core_types::TradeMaterial;
use pricer::{PriceSource, PricerError};
use tokio::sync::mpsc;

/// Transient fetch failures in a row before the source is given up on.
const MAX_CONSECUTIVE_SKIPS: u32 = 10;

pub(crate) enum PriceMessage {
    Shutdown(Ack),
}

/// Drives the price source and forwards every snapshot to the Trade stage.
///
/// Fetching runs on its own task and hands results over through a one-slot
/// channel, so a shutdown request never waits behind a slow fetch. Transient
/// fetch failures are logged and skipped; a fatal one stops the flow.
pub(crate) async fn run(
    mut source: Box<dyn PriceSource>,
    mut mailbox: mpsc::Receiver<PriceMessage>,
    trade: mpsc::Sender<TradeMessage>,
) -> Result<(), EngineError> {
    if let Err(error) = source.initialize().await {
        tracing::error!(%error, "price source failed to initialize");
        shutdown_downstream("trade", &trade).await;
        return Err(error.into());
    }

    let (slot_tx, mut slot) = mpsc::channel::<Result<TradeMaterial, PricerError>>(1);
    let fetcher = tokio::spawn(async move {
        loop {
            let next = match source.next_price().await {
                Ok(Some(material)) => Ok(material),
                Ok(None) => break,
                Err(error) => Err(error),
            };
            let fatal = next.as_ref().is_err_and(PricerError::is_fatal);
            if slot_tx.send(next).await.is_err() || fatal {
                break;
            }
        }
    });

    let mut ticks = 0u64;
    let mut skipped = 0u32;
    let outcome = loop {
        tokio::select! {
            message = mailbox.recv() => {
                let ack = match message {
                    Some(PriceMessage::Shutdown(ack)) => Some(ack),
                    None => None,
                };
                tracing::info!(ticks, "price stage shutting down");
                shutdown_downstream("trade", &trade).await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                break Ok(());
            }
            next = slot.recv() => match next {
                Some(Ok(material)) => {
                    ticks += 1;
                    skipped = 0;
                    if trade.send(TradeMessage::Material(material)).await.is_err() {
                        tracing::warn!(ticks, "trade stage stopped; price stage exiting");
                        break Ok(());
                    }
                }
                Some(Err(error)) if !error.is_fatal() && skipped < MAX_CONSECUTIVE_SKIPS => {
                    skipped += 1;
                    tracing::warn!(%error, skipped, "price fetch failed; skipping tick");
                }
                Some(Err(error)) => {
                    tracing::error!(%error, "price source failed");
                    shutdown_downstream("trade", &trade).await;
                    break Err(error.into());
                }
                None => {
                    tracing::info!(ticks, "price source exhausted");
                    shutdown_downstream("trade", &trade).await;
                    break Ok(());
                }
            },
        }
    };

    fetcher.abort();
    outcome
}
