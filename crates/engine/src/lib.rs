//! # Tradeflow Engine
//!
//! The concurrent execution core. A `Flow` runs three stages, Price, Trade
//! and Record, each draining its own mailbox. The Trade stage hands every
//! tick to a `Trader`, which asks the broker for open orders, partitions
//! them by owning configuration and fans the tick out to the
//! `TradeRunnersExecutor`.
//!
//! ## Architectural Principles
//!
//! - **Actors, not locks:** the order partition table and the simulated
//!   matching engine are each owned by one task and reached only through
//!   its mailbox.
//! - **Fatal vs. transient:** invariant violations stop the run and surface
//!   from `Flow::wait_for_completion`. Failed broker calls and store writes
//!   are logged and skipped.
//! - **Explicit wiring:** `build_trader` and `start_simulation` take fully
//!   populated setup structs.
//!
//! ## Public API
//!
//! - `Flow`, `FlowHandle`, `FlowSetup`: the pipeline and its run control.
//! - `Trader`, `RecordMaterial`: one tick of trading.
//! - `TradeRunnersExecutor`, `TradeRunner`, `split_into_groups`: parallel evaluation.
//! - `OrderPartitionAggregator`, `PartitionMap`: order ownership.
//! - `Recorder`, `LedgerRecorder`, `LedgerStore`: persistence of results.

pub mod error;
pub mod executor;
pub mod flow;
pub mod partition;
pub mod recorder;
pub mod runner;
pub mod setup;
pub mod trader;

pub use error::{EngineError, PartitionError, RecorderError};
pub use executor::{split_into_groups, TradeRunnersExecutor};
pub use flow::{supervise, Flow, FlowHandle, FlowSetup, SupervisedActor};
pub use partition::{OrderPartitionAggregator, PartitionMap, Partitioned};
pub use recorder::{LedgerRecorder, LedgerStore, Recorder};
pub use runner::{ConfigurationResult, RunContext, TradeRunner};
pub use setup::{build_trader, start_simulation, SimulationSetup, TraderSetup};
pub use trader::{RecordMaterial, Trader};
