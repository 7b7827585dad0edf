mod telemetry;

use anyhow::Context;
use api_client::{ApiClient, OandaClient};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use configuration::{FrameParams, TradeOverrides};
use core_types::{
    AlgorithmKind, SessionWindow, TradeDirection, TradeMode, TradePair, TradeRunType, TradeSetType,
};
use database::{connect, run_migrations, DbRepository, NewTradeConfiguration};
use engine::{start_simulation, FlowHandle, LedgerRecorder, SimulationSetup};
use pricer::SimulationPriceSource;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The main entry point for the tradeflow execution engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine: every value can also come from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_dir)?;

    let result = match cli.command {
        Commands::SeedTradeSet(args) => handle_seed_trade_set(args).await,
        Commands::Simulate(args) => handle_simulate(args).await,
        Commands::Summary(args) => handle_summary(args).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    result
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A concurrent execution engine for session-window FX strategies.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory for the daily rolling log file.
    #[arg(long, global = true, default_value = "logs")]
    log_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the default frame trade set for every instrument and session window.
    SeedTradeSet(SeedTradeSetArgs),
    /// Replay historical candles through a stored trade set.
    Simulate(SimulateArgs),
    /// Print the per-configuration results of a stored trade run.
    Summary(SummaryArgs),
}

#[derive(Parser)]
struct SeedTradeSetArgs {
    /// Name of the trade set. Each seed stores a new version under this name.
    #[arg(long, default_value = "frame")]
    name: String,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Name of the trade set to run.
    #[arg(long)]
    trade_set: String,

    /// Version of the trade set to run.
    #[arg(long)]
    version: i32,

    /// First day of the simulated range (format: YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// Day the simulated range ends, exclusive (format: YYYY-MM-DD).
    #[arg(long)]
    to: NaiveDate,

    #[command(flatten)]
    overrides: TradeOverrides,
}

#[derive(Parser)]
struct SummaryArgs {
    /// Identifier of the trade run.
    #[arg(long)]
    run_id: i64,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn open_repository() -> anyhow::Result<DbRepository> {
    let pool = connect().await.context("failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    Ok(DbRepository::new(pool))
}

async fn handle_seed_trade_set(args: SeedTradeSetArgs) -> anyhow::Result<()> {
    let repo = open_repository().await?;
    let params = serde_json::to_value(FrameParams::default())?;

    let mut configurations = Vec::new();
    for pair in TradePair::ALL {
        for window in SessionWindow::ALL {
            for direction in [TradeDirection::Long, TradeDirection::Short] {
                configurations.push(NewTradeConfiguration {
                    pair,
                    window,
                    kind: AlgorithmKind::Frame,
                    params: params.clone(),
                    direction,
                });
            }
        }
    }

    let trade_set = repo
        .add_trade_set(&args.name, TradeSetType::Simulation, &configurations)
        .await?;
    tracing::info!(
        name = %trade_set.name,
        version = trade_set.version,
        configurations = configurations.len(),
        "trade set stored"
    );
    println!(
        "Stored trade set '{}' version {} with {} configurations.",
        trade_set.name,
        trade_set.version,
        configurations.len()
    );
    Ok(())
}

async fn handle_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let mut config = configuration::load_config().context("failed to load configuration")?;
    args.overrides.apply(&mut config);
    configuration::validate(&config).context("invalid command-line overrides")?;

    if args.from >= args.to {
        anyhow::bail!("--from must be earlier than --to");
    }

    let repo = open_repository().await?;
    let detail = repo
        .get_trade_set_detail(&args.trade_set, args.version)
        .await
        .with_context(|| format!("trade set '{}' v{} not found", args.trade_set, args.version))?;
    let run = repo
        .add_trade_run(detail.trade_set.id, TradeRunType::OandaSimulation)
        .await?;
    tracing::info!(
        run_id = run.id,
        trade_set = %detail.trade_set.name,
        version = detail.trade_set.version,
        configurations = detail.configurations.len(),
        "trade run created"
    );

    let client: Arc<dyn ApiClient> = Arc::new(OandaClient::new(&config.oanda)?);
    let price_source = SimulationPriceSource::new(
        client,
        config.simulation.clone(),
        start_of_day(args.from),
        start_of_day(args.to),
    );
    let recorder = LedgerRecorder::new(repo.clone(), run.clone());

    let flow = start_simulation(SimulationSetup {
        configurations: detail.configurations,
        flow: config.flow.clone(),
        trade: config.trade.clone(),
        price_source: Box::new(price_source),
        recorder: Box::new(recorder),
    })?;

    println!("Trade run {} started. Type watch, trade, terminate or shutdown.", run.id);
    let control = tokio::spawn(run_control(flow.handle()));

    let outcome = flow.wait_for_completion().await;
    control.abort();
    outcome.with_context(|| format!("trade run {} stopped on a fatal error", run.id))?;

    print_summary(&repo, run.id).await
}

async fn handle_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let repo = open_repository().await?;
    let run = repo.get_trade_run(args.run_id).await?;
    println!(
        "Trade run {} ({}, {})",
        run.id,
        run.run_type.as_str(),
        run.state.as_str()
    );
    print_summary(&repo, run.id).await
}

// ==============================================================================
// Run Control
// ==============================================================================

/// Applies commands typed on standard input to a running flow.
async fn run_control(handle: FlowHandle) {
    let (tx, mut lines) = mpsc::channel::<String>(16);

    // Blocking stdin reads live on a plain thread so they never hold the
    // runtime open at exit.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    while let Some(line) = lines.recv().await {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("shutdown") {
            tracing::info!("shutdown requested from the console");
            handle.shutdown().await;
            return;
        }
        match command.parse::<TradeMode>() {
            Ok(mode) => {
                if handle.change_trade_mode(mode).await.is_err() {
                    return;
                }
            }
            Err(e) => tracing::warn!(%command, error = %e, "unknown console command"),
        }
    }
}

// ==============================================================================
// Reporting
// ==============================================================================

async fn print_summary(repo: &DbRepository, run_id: i64) -> anyhow::Result<()> {
    let summaries = repo.trade_run_summary(run_id).await?;
    if summaries.is_empty() {
        println!("Trade run {run_id} placed no orders.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Configuration",
        "Pair",
        "Window",
        "Direction",
        "Orders",
        "Open",
        "Winning",
        "Profit",
    ]);
    for summary in &summaries {
        table.add_row(vec![
            summary.configuration_id.to_string(),
            summary.pair.to_string(),
            summary.window.to_string(),
            summary.direction.to_string(),
            summary.order_count.to_string(),
            summary.open_count.to_string(),
            summary.winning_count.to_string(),
            summary.total_profit.round_dp(2).to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
