//! tokenscan CLI - ERC-20 transfer scanner and lock inspector

use alloy::primitives::{Address, U256};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokenscan::{
    erc20_signatures, read_lock_array, AddressRole, AppState, ChainReader, ConfigFile,
    EventIndexer, EventSignature, RecordStore, RpcChainReader, ScanProgress, SqliteStore,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tokenscan")]
#[command(
    version,
    about = "ERC-20 transfer scanner with storage-slot lock decoding"
)]
#[command(after_help = r#"EXAMPLES:
    # Scan USDC transfers into the local store
    tokenscan scan -c 0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48 \
                   -f 18000000 -t 18100000

    # Decode the lock array declared at storage slot 3
    tokenscan locks -c 0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48 -s 3 --json

    # Page through transfers sent by an address
    tokenscan query -a 0x28C6c06298d514Db089934071355E5743bf21d60 -r from

    # Serve the query API over HTTP
    tokenscan serve -b 127.0.0.1:3000

ENVIRONMENT VARIABLES:
    TOKENSCAN_RPC_URL    RPC endpoint URL
    TOKENSCAN_DB         SQLite database path

CONFIG FILE:
    Default: ~/.config/tokenscan/config.toml
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC endpoint URL
    #[arg(long, env = "TOKENSCAN_RPC_URL", global = true)]
    rpc_url: Option<String>,

    /// SQLite database path
    #[arg(long, env = "TOKENSCAN_DB", global = true)]
    db: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a block range for transfer events and persist them
    Scan(ScanArgs),

    /// Decode a lock array from contract storage
    Locks(LocksArgs),

    /// Look up persisted transfers for an address
    Query(QueryArgs),

    /// Serve the query API over HTTP
    Serve(ServeArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Contract address to scan
    #[arg(short, long)]
    contract: String,

    /// Start block number
    #[arg(short = 'f', long, default_value = "0")]
    from_block: u64,

    /// End block number (or "latest")
    #[arg(short = 't', long, default_value = "latest")]
    to_block: String,

    /// Event signature to scan for, e.g. "Transfer(address,address,uint256)"
    /// (can be repeated; defaults to ERC-20 Transfer and Approval)
    #[arg(short, long, action = clap::ArgAction::Append)]
    event: Vec<String>,

    /// Blocks per log request
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Number of parallel requests
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,
}

#[derive(Args)]
struct LocksArgs {
    /// Contract address holding the lock array
    #[arg(short, long)]
    contract: String,

    /// Declared storage slot of the lock array
    #[arg(short, long, default_value = "0")]
    slot: u64,

    /// Print entries as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Address to look up
    #[arg(short, long)]
    address: String,

    /// Which side to match: "from" or "to"
    #[arg(short, long, default_value = "from")]
    role: String,

    /// 1-indexed page
    #[arg(short, long, default_value = "1")]
    page: u64,

    /// Records per page
    #[arg(short, long, default_value = "20")]
    limit: u64,
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address (host:port)
    #[arg(short, long)]
    bind: Option<String>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show config file path
    Path,

    /// Show current config
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    match &cli.command {
        Commands::Scan(args) => run_scan(&cli, args).await,
        Commands::Locks(args) => run_locks(&cli, args).await,
        Commands::Query(args) => run_query(&cli, args),
        Commands::Serve(args) => run_serve(&cli, args).await,
        Commands::Config { action } => handle_config(action),
    }
}

/// Config file values with CLI flags folded in over them.
fn effective_config(cli: &Cli) -> ConfigFile {
    let mut config = ConfigFile::load_default().ok().flatten().unwrap_or_default();
    if let Some(url) = &cli.rpc_url {
        config.rpc_url = url.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    config
}

fn parse_contract(value: &str) -> anyhow::Result<Address> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid contract address: {}", value))
}

async fn run_scan(cli: &Cli, args: &ScanArgs) -> anyhow::Result<()> {
    let contract = parse_contract(&args.contract)?;

    let signatures = if args.event.is_empty() {
        erc20_signatures()
    } else {
        args.event
            .iter()
            .map(|decl| EventSignature::parse(decl))
            .collect::<tokenscan::Result<Vec<_>>>()?
    };

    let config = effective_config(cli);
    let reader = Arc::new(RpcChainReader::new(&config.rpc_url)?);
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    // Resolve end block
    let to_block = if args.to_block.to_lowercase() == "latest" {
        reader.current_height().await?
    } else {
        args.to_block.parse()?
    };

    let indexer = EventIndexer::new(reader, store)
        .with_chunk_size(args.chunk_size.unwrap_or(config.scan.chunk_size))
        .with_concurrency(args.concurrency.unwrap_or(config.scan.concurrency));
    indexer.ensure_schema()?;

    // Set up progress bar
    let pb = if !cli.quiet {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% ({msg})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let pb_clone = pb.clone();
    let indexer = indexer.with_progress(move |progress: ScanProgress| {
        if let Some(ref pb) = pb_clone {
            pb.set_position(progress.percent as u64);
            pb.set_message(format!(
                "{} logs, {:.0} blocks/s",
                progress.logs_fetched, progress.blocks_per_second
            ));
        }
    });

    if !cli.quiet {
        eprintln!(
            "Scanning {} from block {} to {}",
            args.contract, args.from_block, to_block
        );
    }

    let start = Instant::now();
    let report = indexer
        .scan_range(contract, args.from_block, to_block, &signatures)
        .await?;
    let elapsed = start.elapsed();

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    println!(
        "Scanned {} events in {:.2}s: {} inserted, {} duplicates, {} approvals observed, {} unrecognized",
        report.events_seen,
        elapsed.as_secs_f64(),
        report.inserted,
        report.duplicates,
        report.observed,
        report.unrecognized
    );

    if !report.mapping_errors.is_empty() {
        println!("{} logs failed to decode:", report.mapping_errors.len());
        for failure in &report.mapping_errors {
            println!(
                "  {:#x} log {}: {}",
                failure.transaction_hash, failure.log_index, failure.reason
            );
        }
    }

    Ok(())
}

async fn run_locks(cli: &Cli, args: &LocksArgs) -> anyhow::Result<()> {
    let contract = parse_contract(&args.contract)?;

    let config = effective_config(cli);
    let reader = RpcChainReader::new(&config.rpc_url)?;

    let entries = read_lock_array(&reader, contract, U256::from(args.slot)).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No lock entries at slot {}", args.slot);
        return Ok(());
    }

    println!(
        "{:>5}  {:<42}  {:<19}  {}",
        "INDEX", "OWNER", "START", "AMOUNT"
    );
    for entry in &entries {
        let start = DateTime::from_timestamp(entry.start_time as i64, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.start_time.to_string());
        println!(
            "{:>5}  {:<42}  {:<19}  {}",
            entry.index,
            format!("{:#x}", entry.owner),
            start,
            entry.amount
        );
    }

    Ok(())
}

fn run_query(cli: &Cli, args: &QueryArgs) -> anyhow::Result<()> {
    let role: AddressRole = args.role.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let config = effective_config(cli);
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    // The reader is never dialed for local queries.
    let reader = Arc::new(RpcChainReader::new(&config.rpc_url)?);
    let indexer = EventIndexer::new(reader, store);
    indexer.ensure_schema()?;

    let (records, total) =
        indexer.query_by_address(&args.address, role, args.page, args.limit)?;

    if records.is_empty() {
        println!("No transfers found for {} (role: {})", args.address, role);
        return Ok(());
    }

    println!(
        "{} transfers for {} (role: {}), page {} of {}",
        total,
        args.address,
        role,
        args.page,
        total.div_ceil(args.limit)
    );
    println!();
    println!(
        "{:<10}  {:<5}  {:<66}  {}",
        "BLOCK", "LOG", "TRANSACTION", "VALUE"
    );
    for record in &records {
        println!(
            "{:<10}  {:<5}  {:<66}  {}",
            record.block_number, record.log_index, record.transaction_hash, record.value
        );
    }

    Ok(())
}

async fn run_serve(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let config = effective_config(cli);
    let bind = args.bind.clone().unwrap_or(config.server.bind);
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", bind))?;

    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    store.ensure_schema()?;

    tokenscan::serve(addr, AppState { store }).await?;
    Ok(())
}

fn handle_config(action: &ConfigCommands) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Path => {
            println!("{}", ConfigFile::default_path().display());
        }

        ConfigCommands::Show => {
            let path = ConfigFile::default_path();
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                println!("# {}\n", path.display());
                println!("{}", content);
            } else {
                println!("No config file found at: {}", path.display());
                println!("\nDefaults:\n");
                println!("{}", toml::to_string_pretty(&ConfigFile::default())?);
            }
        }
    }

    Ok(())
}
