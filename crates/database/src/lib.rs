//! # Tradeflow Database Crate
//!
//! The PostgreSQL archive of trade sets, trade runs and the orders each run
//! placed.
//!
//! - `connect` / `run_migrations`: pool setup and schema upgrades.
//! - `DbRepository`: every query the application issues, behind typed methods.
//! - `DbError`: the errors this crate can return.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, connect_with, run_migrations};
pub use error::DbError;
pub use repository::{param_hash, ConfigurationSummary, DbRepository, NewTradeConfiguration};
