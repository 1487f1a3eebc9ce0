use clap::Parser;
use marketpay::config::Config;
use marketpay::domain::ports::StoreHandle;
use marketpay::infrastructure::dispatch::ChannelDispatcher;
use marketpay::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use marketpay::infrastructure::rocksdb::RocksDbStore;
use marketpay::interfaces::csv::command_reader::CommandReader;
use marketpay::interfaces::csv::wallet_writer::WalletReportWriter;
use marketpay::interfaces::replay::Replay;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Tax rate applied to the goods subtotal of each order
    #[arg(long, default_value = "0.15")]
    tax_rate: Decimal,

    /// Flat shipping cost added to each order
    #[arg(long, default_value = "0")]
    shipping: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so the report on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let store: StoreHandle = match cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            // Use persistent storage (RocksDB)
            Arc::new(RocksDbStore::open(db_path).into_diagnostic()?)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Arc::new(InMemoryStore::new())
        }
        None => {
            // Use in-memory storage
            Arc::new(InMemoryStore::new())
        }
    };

    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let config = Config {
        tax_rate: cli.tax_rate,
        shipping_cost: cli.shipping,
        ..Config::default()
    };
    let mut replay = Replay::new(store, Arc::new(dispatcher), config);

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for row_result in reader.commands() {
        match row_result {
            Ok(row) => {
                if let Err(e) = replay.apply(row).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Surface the notifications the run produced
    while let Ok(note) = notifications.try_recv() {
        tracing::info!(
            recipient = %note.recipient,
            order = %note.order_id,
            kind = ?note.kind,
            "{}", note.message
        );
    }

    // Collect final wallet state
    let wallets = replay.wallets().await.into_diagnostic()?;

    // Output final state
    let stdout = io::stdout();
    let writer = WalletReportWriter::new(stdout.lock());
    writer.write(&wallets).into_diagnostic()?;

    Ok(())
}
