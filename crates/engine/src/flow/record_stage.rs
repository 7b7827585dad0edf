use super::Ack;
use crate::error::{EngineError, RecorderError};
use crate::recorder::Recorder;
use crate::trader::RecordMaterial;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

pub(crate) enum RecordMessage {
    Record(RecordMaterial),
    Shutdown(Ack),
}

/// Applies records as they arrive and flushes the ledger on a timer.
///
/// Records, timed writes and the final close all run on this one task, so
/// writes never overlap.
pub(crate) async fn run(
    mut recorder: Box<dyn Recorder>,
    mut mailbox: mpsc::Receiver<RecordMessage>,
    write_interval: Duration,
) -> Result<(), EngineError> {
    let mut timer = interval(write_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    timer.tick().await;

    loop {
        tokio::select! {
            message = mailbox.recv() => match message {
                Some(RecordMessage::Record(material)) => {
                    if let Err(error) = recorder.record(material).await {
                        settle(error)?;
                    }
                }
                Some(RecordMessage::Shutdown(ack)) => {
                    let outcome = close(recorder.as_mut()).await;
                    let _ = ack.send(());
                    return outcome;
                }
                None => return close(recorder.as_mut()).await,
            },
            _ = timer.tick() => {
                if let Err(error) = recorder.write().await {
                    settle(error)?;
                }
            }
        }
    }
}

async fn close(recorder: &mut dyn Recorder) -> Result<(), EngineError> {
    tracing::info!("record stage closing the ledger");
    match recorder.close().await {
        Ok(()) => Ok(()),
        Err(error) => settle(error),
    }
}

fn settle(error: RecorderError) -> Result<(), EngineError> {
    if error.is_fatal() {
        tracing::error!(%error, "ledger invariant violated");
        return Err(error.into());
    }
    tracing::warn!(%error, "ledger write failed; will retry on the next flush");
    Ok(())
}
