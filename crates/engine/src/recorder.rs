use crate::error::RecorderError;
use crate::trader::RecordMaterial;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{ClosedOrder, CreatedOrder, OpenOrder, OrderId, TradeRun, TradeRunState};
use database::{DbError, DbRepository};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Persists what the Trade stage produced.
#[async_trait]
pub trait Recorder: Send {
    /// Applies one tick to the in-memory ledger.
    async fn record(&mut self, material: RecordMaterial) -> Result<(), RecorderError>;

    /// Flushes the ledger to the store.
    async fn write(&mut self) -> Result<(), RecorderError>;

    /// Final flush, then marks the run finished.
    async fn close(&mut self) -> Result<(), RecorderError>;
}

/// The persistence operations the ledger recorder relies on.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn start_run(&self, run_id: i64, started_at: DateTime<Utc>) -> Result<(), DbError>;
    async fn finish_run(&self, run_id: i64, finished_at: DateTime<Utc>) -> Result<(), DbError>;
    async fn add_created_order(&self, run_id: i64, configuration_id: i64, created: &CreatedOrder) -> Result<(), DbError>;
    async fn close_order(&self, run_id: i64, closed: &ClosedOrder) -> Result<(), DbError>;
    async fn update_profit(&self, run_id: i64, order_id: OrderId, profit: Decimal) -> Result<(), DbError>;
}

#[async_trait]
impl LedgerStore for DbRepository {
    async fn start_run(&self, run_id: i64, started_at: DateTime<Utc>) -> Result<(), DbError> {
        self.update_trade_run_for_start(run_id, started_at).await
    }

    async fn finish_run(&self, run_id: i64, finished_at: DateTime<Utc>) -> Result<(), DbError> {
        self.update_trade_run_for_finish(run_id, finished_at).await
    }

    async fn add_created_order(&self, run_id: i64, configuration_id: i64, created: &CreatedOrder) -> Result<(), DbError> {
        self.add_created_order_if_needed(run_id, configuration_id, created).await
    }

    async fn close_order(&self, run_id: i64, closed: &ClosedOrder) -> Result<(), DbError> {
        self.update_order_for_close(run_id, closed).await
    }

    async fn update_profit(&self, run_id: i64, order_id: OrderId, profit: Decimal) -> Result<(), DbError> {
        self.update_order_for_profit(run_id, order_id, profit).await
    }
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    configuration_id: i64,
    created: CreatedOrder,
    closed: Option<ClosedOrder>,
    stored: bool,
}

/// Keeps orders of one run in memory between flushes.
pub struct LedgerRecorder<S> {
    store: S,
    run: TradeRun,
    entries: BTreeMap<OrderId, LedgerEntry>,
    latest_open: Vec<OpenOrder>,
}

impl<S: LedgerStore> LedgerRecorder<S> {
    pub fn new(store: S, run: TradeRun) -> Self {
        Self {
            store,
            run,
            entries: BTreeMap::new(),
            latest_open: Vec::new(),
        }
    }

    pub fn run(&self) -> &TradeRun {
        &self.run
    }

    /// Orders still held in memory.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    async fn start_if_pending(&mut self) -> Result<(), RecorderError> {
        if self.run.state != TradeRunState::Pending {
            return Ok(());
        }
        let now = Utc::now();
        self.store.start_run(self.run.id, now).await?;
        self.run.state = TradeRunState::Running;
        self.run.started_at = Some(now);
        tracing::info!(run_id = self.run.id, "trade run started");
        Ok(())
    }
}

#[async_trait]
impl<S: LedgerStore> Recorder for LedgerRecorder<S> {
    async fn record(&mut self, material: RecordMaterial) -> Result<(), RecorderError> {
        for result in material.results {
            for created in result.created {
                let order_id = created.order_id;
                if self.entries.contains_key(&order_id) {
                    return Err(RecorderError::DuplicateCreatedOrder(order_id));
                }
                self.entries.insert(
                    order_id,
                    LedgerEntry {
                        configuration_id: result.configuration_id,
                        created,
                        closed: None,
                        stored: false,
                    },
                );
            }
            for closed in result.closed {
                let entry = self
                    .entries
                    .get_mut(&closed.order_id)
                    .ok_or(RecorderError::UnknownClosedOrder(closed.order_id))?;
                if entry.closed.is_some() {
                    return Err(RecorderError::DuplicateClosedOrder(closed.order_id));
                }
                entry.closed = Some(closed);
            }
        }

        self.latest_open = material.open_orders;

        // The tick is already in the ledger; a failed start stays pending and
        // is retried by the next record or write.
        self.start_if_pending().await
    }

    async fn write(&mut self) -> Result<(), RecorderError> {
        self.start_if_pending().await?;
        let run_id = self.run.id;
        let ids: Vec<OrderId> = self.entries.keys().copied().collect();
        let mut written = 0usize;

        for order_id in ids {
            let Some(entry) = self.entries.get_mut(&order_id) else {
                continue;
            };
            if !entry.stored {
                self.store
                    .add_created_order(run_id, entry.configuration_id, &entry.created)
                    .await?;
                entry.stored = true;
            }
            let closed = entry.closed.clone();
            if let Some(closed) = closed {
                self.store.close_order(run_id, &closed).await?;
                self.entries.remove(&order_id);
            }
            written += 1;
        }

        let latest_open = std::mem::take(&mut self.latest_open);
        for open in &latest_open {
            self.store
                .update_profit(run_id, open.order_id(), open.unrealized_profit)
                .await?;
        }

        tracing::debug!(run_id, written, open = latest_open.len(), pending = self.entries.len(), "ledger flushed");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RecorderError> {
        self.write().await?;
        let now = Utc::now();
        self.store.finish_run(self.run.id, now).await?;
        self.run.state = TradeRunState::Finished;
        self.run.finished_at = Some(now);
        tracing::info!(run_id = self.run.id, pending = self.entries.len(), "trade run finished");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::runner::ConfigurationResult;
    use chrono::TimeZone;
    use core_types::{SessionWindow, TradeConfigurationKey, TradeDirection, TradePair, TradeRunType};
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    /// Records every store call as a line of text.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub fail_writes: Arc<Mutex<bool>>,
    }

    impl MemoryStore {
        fn push(&self, call: String) -> Result<(), DbError> {
            if *self.fail_writes.lock().unwrap() {
                return Err(DbError::NotFound);
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LedgerStore for MemoryStore {
        async fn start_run(&self, run_id: i64, _started_at: DateTime<Utc>) -> Result<(), DbError> {
            self.push(format!("start {run_id}"))
        }

        async fn finish_run(&self, run_id: i64, _finished_at: DateTime<Utc>) -> Result<(), DbError> {
            self.push(format!("finish {run_id}"))
        }

        async fn add_created_order(&self, _run_id: i64, configuration_id: i64, created: &CreatedOrder) -> Result<(), DbError> {
            self.push(format!("create {} for {configuration_id}", created.order_id))
        }

        async fn close_order(&self, _run_id: i64, closed: &ClosedOrder) -> Result<(), DbError> {
            self.push(format!("close {} at {}", closed.order_id, closed.realized_profit))
        }

        async fn update_profit(&self, _run_id: i64, order_id: OrderId, profit: Decimal) -> Result<(), DbError> {
            self.push(format!("profit {order_id} {profit}"))
        }
    }

    pub(crate) fn pending_run() -> TradeRun {
        TradeRun {
            id: 7,
            trade_set_id: 1,
            run_type: TradeRunType::OandaSimulation,
            state: TradeRunState::Pending,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            started_at: None,
            finished_at: None,
        }
    }

    fn created(id: u64) -> CreatedOrder {
        CreatedOrder {
            order_id: OrderId(id),
            pair: TradePair::GbpUsd,
            direction: TradeDirection::Long,
            units: dec!(1000),
            time_at_open: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
            price_at_open: dec!(1.3002),
        }
    }

    fn closed(id: u64) -> ClosedOrder {
        ClosedOrder {
            order_id: OrderId(id),
            pair: TradePair::GbpUsd,
            direction: TradeDirection::Long,
            time_at_close: Utc.with_ymd_and_hms(2024, 1, 8, 1, 0, 0).unwrap(),
            price_at_close: dec!(1.3050),
            realized_profit: dec!(48),
        }
    }

    fn tick(created: Vec<CreatedOrder>, closed: Vec<ClosedOrder>, open_orders: Vec<OpenOrder>) -> RecordMaterial {
        RecordMaterial {
            time: Utc.with_ymd_and_hms(2024, 1, 8, 1, 0, 0).unwrap(),
            open_orders,
            results: vec![ConfigurationResult {
                key: TradeConfigurationKey::new(TradePair::GbpUsd, SessionWindow::TokyoAm, 3),
                configuration_id: 11,
                created,
                closed,
            }],
        }
    }

    #[tokio::test]
    async fn ledger_is_flushed_and_closed_entries_dropped() {
        let store = MemoryStore::default();
        let mut recorder = LedgerRecorder::new(store.clone(), pending_run());

        recorder.record(tick(vec![created(0), created(1)], vec![], vec![])).await.unwrap();
        assert_eq!(recorder.run().state, TradeRunState::Running);
        let open = OpenOrder { order: created(1), unrealized_profit: dec!(12) };
        recorder.record(tick(vec![], vec![closed(0)], vec![open])).await.unwrap();

        recorder.write().await.unwrap();
        assert_eq!(recorder.pending(), 1);
        recorder.close().await.unwrap();

        assert_eq!(
            store.calls(),
            vec![
                "start 7",
                "create 0 for 11",
                "close 0 at 48",
                "create 1 for 11",
                "profit 1 12",
                "finish 7",
            ]
        );
        assert_eq!(recorder.run().state, TradeRunState::Finished);
    }

    #[tokio::test]
    async fn ledger_violations_are_fatal() {
        let mut recorder = LedgerRecorder::new(MemoryStore::default(), pending_run());
        recorder.record(tick(vec![created(0)], vec![], vec![])).await.unwrap();

        let duplicate = recorder.record(tick(vec![created(0)], vec![], vec![])).await.unwrap_err();
        assert!(matches!(duplicate, RecorderError::DuplicateCreatedOrder(OrderId(0))));
        assert!(duplicate.is_fatal());

        let unknown = recorder.record(tick(vec![], vec![closed(5)], vec![])).await.unwrap_err();
        assert!(matches!(unknown, RecorderError::UnknownClosedOrder(OrderId(5))));
    }

    #[tokio::test]
    async fn failed_flush_keeps_entries_for_the_next_write() {
        let store = MemoryStore::default();
        let mut recorder = LedgerRecorder::new(store.clone(), pending_run());
        recorder.record(tick(vec![created(0)], vec![], vec![])).await.unwrap();

        *store.fail_writes.lock().unwrap() = true;
        let failure = recorder.write().await.unwrap_err();
        assert!(!failure.is_fatal());
        assert_eq!(recorder.pending(), 1);

        *store.fail_writes.lock().unwrap() = false;
        recorder.write().await.unwrap();
        assert_eq!(store.calls(), vec!["start 7", "create 0 for 11"]);
    }

    #[tokio::test]
    async fn tick_survives_a_failed_run_start() {
        let store = MemoryStore::default();
        let mut recorder = LedgerRecorder::new(store.clone(), pending_run());

        *store.fail_writes.lock().unwrap() = true;
        let failure = recorder.record(tick(vec![created(0)], vec![], vec![])).await.unwrap_err();
        assert!(!failure.is_fatal());
        assert_eq!(recorder.run().state, TradeRunState::Pending);
        assert_eq!(recorder.pending(), 1);

        *store.fail_writes.lock().unwrap() = false;
        recorder.record(tick(vec![], vec![closed(0)], vec![])).await.unwrap();
        assert_eq!(recorder.run().state, TradeRunState::Running);

        recorder.write().await.unwrap();
        assert_eq!(store.calls(), vec!["start 7", "create 0 for 11", "close 0 at 48"]);
        assert_eq!(recorder.pending(), 0);
    }
}
