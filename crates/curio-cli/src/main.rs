//! Curio sync diagnostics CLI
//!
//! Inspects the durable operation queue and conflict records on this device
//! without needing remote connectivity.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use curio_core::conflict::ConflictStore;
use curio_core::models::{ConflictRecord, Operation, OperationType};
use curio_core::queue::OperationStore;
use curio_core::store::LibSqlLocalStore;
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "curio")]
#[command(about = "Inspect the Curio offline sync queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local sync database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show queue depth, pending counts by type, and pending conflicts
    Status,
    /// List pending operations in enqueue order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List conflict records awaiting resolution
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop all pending operations (diagnostics only)
    Clear {
        /// Confirm the destructive clear
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] curio_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Refusing to clear the queue without --yes")]
    ClearNotConfirmed,
    #[error("Could not determine a data directory; pass --db-path")]
    NoDataDir,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("curio=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;

    match cli.command {
        Commands::Status => run_status(&db_path).await,
        Commands::List { json } => run_list(json, &db_path).await,
        Commands::Conflicts { json } => run_conflicts(json, &db_path).await,
        Commands::Clear { yes } => run_clear(yes, &db_path).await,
    }
}

fn resolve_db_path(override_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = override_path {
        return Ok(path);
    }
    let base = dirs::data_dir().ok_or(CliError::NoDataDir)?;
    Ok(base.join("curio").join("sync.db"))
}

async fn open_stores(db_path: &PathBuf) -> Result<(OperationStore, ConflictStore), CliError> {
    let local = Arc::new(LibSqlLocalStore::open(db_path).await?);
    let operations = OperationStore::new(Arc::clone(&local) as Arc<dyn curio_core::store::LocalStore>);
    let conflicts = ConflictStore::new(local as Arc<dyn curio_core::store::LocalStore>);
    Ok((operations, conflicts))
}

async fn run_status(db_path: &PathBuf) -> Result<(), CliError> {
    let (operations, conflicts) = open_stores(db_path).await?;

    let depth = operations.depth().await?;
    let counts = operations.counts_by_type().await?;
    let pending_conflicts = conflicts.pending_count().await?;

    println!("Queue depth: {depth}");
    for op_type in [
        OperationType::Create,
        OperationType::Update,
        OperationType::Delete,
    ] {
        let count = counts.get(&op_type).copied().unwrap_or(0);
        println!("  {op_type}: {count}");
    }
    println!("Pending conflicts: {pending_conflicts}");
    Ok(())
}

#[derive(Debug, Serialize)]
struct OperationListItem {
    id: String,
    op_type: String,
    entity_kind: String,
    entity_id: String,
    enqueued_at: String,
    retry_count: u32,
    last_error: Option<String>,
}

fn operation_to_list_item(op: &Operation) -> OperationListItem {
    OperationListItem {
        id: op.id.as_str(),
        op_type: op.op_type.to_string(),
        entity_kind: op.entity_kind.to_string(),
        entity_id: op.entity_id.clone(),
        enqueued_at: format_timestamp(op.enqueued_at),
        retry_count: op.retry_count,
        last_error: op.last_error.clone(),
    }
}

async fn run_list(as_json: bool, db_path: &PathBuf) -> Result<(), CliError> {
    let (operations, _) = open_stores(db_path).await?;
    let pending = operations.load().await?;

    if as_json {
        let items: Vec<OperationListItem> = pending.iter().map(operation_to_list_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if pending.is_empty() {
        println!("Queue is empty");
    } else {
        for op in &pending {
            let retries = if op.retry_count > 0 {
                format!(" (retries: {})", op.retry_count)
            } else {
                String::new()
            };
            println!(
                "{}  {} {} {}{}",
                format_timestamp(op.enqueued_at),
                op.op_type,
                op.entity_kind,
                op.entity_id,
                retries
            );
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConflictListItem {
    id: String,
    entity_kind: String,
    entity_id: String,
    detected_at: String,
}

fn conflict_to_list_item(record: &ConflictRecord) -> ConflictListItem {
    ConflictListItem {
        id: record.id.as_str(),
        entity_kind: record.entity_kind.to_string(),
        entity_id: record.entity_id.clone(),
        detected_at: format_timestamp(record.detected_at),
    }
}

async fn run_conflicts(as_json: bool, db_path: &PathBuf) -> Result<(), CliError> {
    let (_, conflicts) = open_stores(db_path).await?;
    let pending = conflicts.pending().await?;

    if as_json {
        let items: Vec<ConflictListItem> = pending.iter().map(conflict_to_list_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if pending.is_empty() {
        println!("No pending conflicts");
    } else {
        for record in &pending {
            println!(
                "{}  {} {} ({})",
                format_timestamp(record.detected_at),
                record.entity_kind,
                record.entity_id,
                record.id
            );
        }
    }
    Ok(())
}

async fn run_clear(confirmed: bool, db_path: &PathBuf) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ClearNotConfirmed);
    }
    let (operations, _) = open_stores(db_path).await?;
    let depth = operations.depth().await?;
    operations.clear().await?;
    println!("Cleared {depth} pending operation(s)");
    Ok(())
}

fn format_timestamp(unix_ms: i64) -> String {
    Utc.timestamp_millis_opt(unix_ms)
        .single()
        .map_or_else(|| unix_ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
