use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::{
    AlgorithmKind, ClosedOrder, CreatedOrder, OrderId, OrderState, SessionWindow, TradeAlgorithm,
    TradeConfiguration, TradeDirection, TradePair, TradeRun, TradeRunState, TradeRunType,
    TradeSet, TradeSetDetail, TradeSetType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

/// A configuration to store as part of a new trade set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTradeConfiguration {
    pub pair: TradePair,
    pub window: SessionWindow,
    pub kind: AlgorithmKind,
    pub params: JsonValue,
    pub direction: TradeDirection,
}

/// Aggregated results of one configuration within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub configuration_id: i64,
    pub pair: TradePair,
    pub window: SessionWindow,
    pub direction: TradeDirection,
    pub order_count: i64,
    pub open_count: i64,
    pub winning_count: i64,
    pub total_profit: Decimal,
}

/// Stable hash of a parameter document. `serde_json` keeps object keys
/// sorted, so equal documents serialize identically.
pub fn param_hash(params: &JsonValue) -> String {
    let canonical = params.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn trade_set_from_row(row: &PgRow) -> Result<TradeSet, DbError> {
    let set_type: String = row.try_get("set_type")?;
    Ok(TradeSet {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        set_type: set_type.parse::<TradeSetType>()?,
        created_at: row.try_get("created_at")?,
    })
}

fn trade_run_from_row(row: &PgRow) -> Result<TradeRun, DbError> {
    let run_type: String = row.try_get("run_type")?;
    let state: String = row.try_get("state")?;
    Ok(TradeRun {
        id: row.try_get("id")?,
        trade_set_id: row.try_get("trade_set_id")?,
        run_type: run_type.parse::<TradeRunType>()?,
        state: state.parse::<TradeRunState>()?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

fn configuration_from_row(row: &PgRow) -> Result<TradeConfiguration, DbError> {
    let pair: String = row.try_get("pair")?;
    let window: String = row.try_get("session_window")?;
    let kind: String = row.try_get("algorithm_type")?;
    let direction: String = row.try_get("direction")?;
    Ok(TradeConfiguration {
        id: row.try_get("id")?,
        pair: pair.parse()?,
        window: window.parse()?,
        algorithm: TradeAlgorithm {
            id: row.try_get("algorithm_id")?,
            kind: kind.parse()?,
            params: row.try_get("param")?,
            direction: direction.parse()?,
        },
    })
}

fn order_id_param(order_id: OrderId) -> i64 {
    i64::try_from(order_id.0).unwrap_or(i64::MAX)
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores a new version of the named trade set.
    ///
    /// Algorithms and configurations are shared between sets: identical rows
    /// are reused instead of duplicated.
    pub async fn add_trade_set(
        &self,
        name: &str,
        set_type: TradeSetType,
        configurations: &[NewTradeConfiguration],
    ) -> Result<TradeSet, DbError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO trade_sets (name, version, set_type)
            SELECT $1, COALESCE(MAX(version), 0) + 1, $2 FROM trade_sets WHERE name = $1
            RETURNING id, name, version, set_type, created_at
            "#,
        )
        .bind(name)
        .bind(set_type.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let trade_set = trade_set_from_row(&row)?;

        for configuration in configurations {
            let algorithm_id: i64 = sqlx::query(
                r#"
                INSERT INTO trade_algorithms (algorithm_type, param, param_hash, direction)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (algorithm_type, param_hash, direction)
                DO UPDATE SET algorithm_type = EXCLUDED.algorithm_type
                RETURNING id
                "#,
            )
            .bind(configuration.kind.as_str())
            .bind(&configuration.params)
            .bind(param_hash(&configuration.params))
            .bind(configuration.direction.as_str())
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;

            let configuration_id: i64 = sqlx::query(
                r#"
                INSERT INTO trade_configurations (pair, session_window, algorithm_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (pair, session_window, algorithm_id)
                DO UPDATE SET pair = EXCLUDED.pair
                RETURNING id
                "#,
            )
            .bind(configuration.pair.as_str())
            .bind(configuration.window.as_str())
            .bind(algorithm_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("id")?;

            sqlx::query(
                r#"
                INSERT INTO trade_set_configurations (trade_set_id, trade_configuration_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(trade_set.id)
            .bind(configuration_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(name, version = trade_set.version, configurations = configurations.len(), "trade set stored");
        Ok(trade_set)
    }

    /// Fetches a trade set and every configuration it groups.
    pub async fn get_trade_set_detail(
        &self,
        name: &str,
        version: i32,
    ) -> Result<TradeSetDetail, DbError> {
        let row = sqlx::query(
            "SELECT id, name, version, set_type, created_at FROM trade_sets WHERE name = $1 AND version = $2",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;
        let trade_set = trade_set_from_row(&row)?;

        let rows = sqlx::query(
            r#"
            SELECT tc.id, tc.pair, tc.session_window, tc.algorithm_id,
                   ta.algorithm_type, ta.param, ta.direction
            FROM trade_set_configurations AS tsc
            JOIN trade_configurations AS tc ON tc.id = tsc.trade_configuration_id
            JOIN trade_algorithms AS ta ON ta.id = tc.algorithm_id
            WHERE tsc.trade_set_id = $1
            ORDER BY tc.id ASC
            "#,
        )
        .bind(trade_set.id)
        .fetch_all(&self.pool)
        .await?;

        let configurations = rows
            .iter()
            .map(configuration_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TradeSetDetail {
            trade_set,
            configurations,
        })
    }

    /// Creates a pending run of a trade set.
    pub async fn add_trade_run(
        &self,
        trade_set_id: i64,
        run_type: TradeRunType,
    ) -> Result<TradeRun, DbError> {
        let row = sqlx::query(
            r#"
            INSERT INTO trade_runs (trade_set_id, run_type, state)
            VALUES ($1, $2, $3)
            RETURNING id, trade_set_id, run_type, state, created_at, started_at, finished_at
            "#,
        )
        .bind(trade_set_id)
        .bind(run_type.as_str())
        .bind(TradeRunState::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;
        trade_run_from_row(&row)
    }

    pub async fn get_trade_run(&self, run_id: i64) -> Result<TradeRun, DbError> {
        let row = sqlx::query(
            "SELECT id, trade_set_id, run_type, state, created_at, started_at, finished_at FROM trade_runs WHERE id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;
        trade_run_from_row(&row)
    }

    pub async fn update_trade_run_for_start(
        &self,
        run_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE trade_runs SET state = $2, started_at = $3 WHERE id = $1")
            .bind(run_id)
            .bind(TradeRunState::Running.as_str())
            .bind(started_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_trade_run_for_finish(
        &self,
        run_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE trade_runs SET state = $2, finished_at = $3 WHERE id = $1")
            .bind(run_id)
            .bind(TradeRunState::Finished.as_str())
            .bind(finished_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts an order unless the run already recorded its broker id.
    pub async fn add_created_order_if_needed(
        &self,
        run_id: i64,
        configuration_id: i64,
        created: &CreatedOrder,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                trade_run_id, broker_order_id, trade_configuration_id, pair, units,
                direction, state, profit, time_at_open, price_at_open
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9)
            ON CONFLICT (trade_run_id, broker_order_id) DO NOTHING
            "#,
        )
        .bind(run_id)
        .bind(order_id_param(created.order_id))
        .bind(configuration_id)
        .bind(created.pair.as_str())
        .bind(created.units)
        .bind(created.direction.as_str())
        .bind(OrderState::Open.as_str())
        .bind(created.time_at_open)
        .bind(created.price_at_open)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_order_for_close(
        &self,
        run_id: i64,
        closed: &ClosedOrder,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET state = $3, profit = $4, time_at_close = $5, price_at_close = $6
            WHERE trade_run_id = $1 AND broker_order_id = $2
            "#,
        )
        .bind(run_id)
        .bind(order_id_param(closed.order_id))
        .bind(OrderState::Closed.as_str())
        .bind(closed.realized_profit)
        .bind(closed.time_at_close)
        .bind(closed.price_at_close)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Refreshes the unrealized profit of an order. Closed orders keep their
    /// realized figure.
    pub async fn update_order_for_profit(
        &self,
        run_id: i64,
        order_id: OrderId,
        profit: Decimal,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE orders SET profit = $3 WHERE trade_run_id = $1 AND broker_order_id = $2 AND state = $4",
        )
        .bind(run_id)
        .bind(order_id_param(order_id))
        .bind(profit)
        .bind(OrderState::Open.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Per-configuration results of a run, best performers first.
    pub async fn trade_run_summary(&self, run_id: i64) -> Result<Vec<ConfigurationSummary>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT tc.id AS configuration_id, tc.pair, tc.session_window, ta.direction,
                   COUNT(o.id) AS order_count,
                   COUNT(o.id) FILTER (WHERE o.state = 'open') AS open_count,
                   COUNT(o.id) FILTER (WHERE o.profit > 0) AS winning_count,
                   COALESCE(SUM(o.profit), 0) AS total_profit
            FROM orders AS o
            JOIN trade_configurations AS tc ON tc.id = o.trade_configuration_id
            JOIN trade_algorithms AS ta ON ta.id = tc.algorithm_id
            WHERE o.trade_run_id = $1
            GROUP BY tc.id, tc.pair, tc.session_window, ta.direction
            ORDER BY total_profit DESC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let pair: String = row.try_get("pair")?;
                let window: String = row.try_get("session_window")?;
                let direction: String = row.try_get("direction")?;
                Ok(ConfigurationSummary {
                    configuration_id: row.try_get("configuration_id")?,
                    pair: pair.parse()?,
                    window: window.parse()?,
                    direction: direction.parse()?,
                    order_count: row.try_get("order_count")?,
                    open_count: row.try_get("open_count")?,
                    winning_count: row.try_get("winning_count")?,
                    total_profit: row.try_get("total_profit")?,
                })
            })
            .collect()
    }
}
