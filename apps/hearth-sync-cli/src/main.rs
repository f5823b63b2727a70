//! hearth-sync - Operator CLI for the hearth reconciliation engine
//!
//! This CLI enables operators to:
//! - Run full, delta and registry-only passes against a snapshot of the
//!   remote controller
//! - Inspect and expire sync run records
//! - Apply database migrations

use clap::{Args, Parser, Subcommand};
use hearth_db::{MemoryStore, PgStore, SyncMode, SyncRun, SyncStores, SyncTrigger};
use hearth_sync::{ReconciliationOrchestrator, SnapshotFetcher};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

mod config;
mod error;
mod logging;

use config::Config;
use error::CliResult;

/// hearth-sync - Reconcile a smart-home controller into the local store
#[derive(Parser)]
#[command(name = "hearth-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Sync(SyncArgs),

    /// Inspect and manage sync run records
    Runs(RunsArgs),

    /// Apply pending database migrations
    Migrate,
}

/// Arguments for the sync command
#[derive(Args, Debug)]
struct SyncArgs {
    /// Pass kind: full, delta or registry-only
    #[arg(long, default_value = "full")]
    mode: SyncMode,

    /// What caused this pass: manual, scheduled, startup or api
    #[arg(long, default_value = "manual")]
    trigger: SyncTrigger,

    /// Reconcile into an in-memory store instead of PostgreSQL
    #[arg(long)]
    memory: bool,
}

#[derive(Args, Debug)]
struct RunsArgs {
    #[command(subcommand)]
    command: RunsCommands,
}

#[derive(Subcommand, Debug)]
enum RunsCommands {
    /// List the most recent runs
    List {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one run as JSON
    Show {
        /// Run ID (UUID)
        id: Uuid,
    },
    /// Mark runs stuck in `running` past the stale-run timeout as failed
    Expire,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match Config::from_env() {
        Ok(config) => {
            logging::init_logging(&config.log_filter);
            run(cli, config).await
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli, config: Config) -> CliResult<()> {
    match cli.command {
        Commands::Sync(args) => execute_sync(args, &config).await,
        Commands::Runs(args) => execute_runs(args, &config).await,
        Commands::Migrate => execute_migrate(&config).await,
    }
}

async fn connect(config: &Config) -> CliResult<PgStore> {
    let url = config.require_database_url()?;
    Ok(PgStore::connect(url, config.database_max_connections).await?)
}

fn build_orchestrator(config: &Config, stores: SyncStores) -> CliResult<ReconciliationOrchestrator> {
    let fetcher = Arc::new(SnapshotFetcher::new(config.require_snapshot_path()?));
    Ok(ReconciliationOrchestrator::new(
        fetcher,
        stores,
        config.sync_config(),
    ))
}

async fn execute_sync(args: SyncArgs, config: &Config) -> CliResult<()> {
    let stores = if args.memory {
        MemoryStore::new().stores()
    } else {
        connect(config).await?.stores()
    };
    let orchestrator = build_orchestrator(config, stores)?;

    let run = orchestrator.run(args.mode, args.trigger).await?;
    print_json(&run)
}

async fn execute_runs(args: RunsArgs, config: &Config) -> CliResult<()> {
    let store = connect(config).await?;
    let orchestrator = build_orchestrator(config, store.stores())?;

    match args.command {
        RunsCommands::List { limit, json } => {
            let runs = orchestrator.list_runs(limit).await?;
            if json {
                return print_json(&runs);
            }
            if runs.is_empty() {
                println!("No sync runs recorded for this store.");
            }
            for run in &runs {
                println!("{}", summary_line(run));
            }
            Ok(())
        }
        RunsCommands::Show { id } => print_json(&orchestrator.get_run(id).await?),
        RunsCommands::Expire => {
            let expired = orchestrator.expire_abandoned_runs().await?;
            info!(count = expired.len(), "Expired abandoned runs");
            for id in &expired {
                println!("{id}");
            }
            Ok(())
        }
    }
}

async fn execute_migrate(config: &Config) -> CliResult<()> {
    let store = connect(config).await?;
    store.migrate().await?;
    println!("Migrations applied.");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary_line(run: &SyncRun) -> String {
    let totals = run.statistics.totals();
    format!(
        "{}  {:<9}  {:<13}  {:<9}  {}  +{} ~{} -{}  {}",
        run.id,
        run.status.as_str(),
        run.mode.as_str(),
        run.trigger.as_str(),
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        totals.added,
        totals.updated,
        totals.removed,
        run.error_message.as_deref().unwrap_or(""),
    )
}
