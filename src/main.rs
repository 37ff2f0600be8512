//! Command-line interface for pgqbuf: manage the schema and run benchmarks.
//!
//! This file implements the CLI entry point for pgqbuf, allowing users to
//! install or drop the queue tables and to drive the load generator against
//! one of the five strategies.
//!
//! ## How
//!
//! Run the CLI with various subcommands. See `--help` for usage details.
//!
//! ### Example
//!
//! ```sh
//! pgqbuf install
//! pgqbuf bench --strategy partitioned --duration-secs 60
//! ```
use clap::{Parser, Subcommand};
use pgqbuf::{bench, Admin, BenchConfig, Strategy};
use sqlx::postgres::PgPoolOptions;

use std::process;

#[derive(Parser)]
#[command(name = "pgqbuf")]
#[command(about = "PostgreSQL-backed queue buffer strategies and load generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (overrides PGQBUF_DSN and the built-in default)
    #[arg(long, short = 'd')]
    dsn: Option<String>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the queue buffer tables
    Install,
    /// Drop the queue buffer tables
    Uninstall,
    /// Remove all pending events from every table
    Purge,
    /// Run the load generator against one strategy
    Bench {
        /// Strategy under test
        #[arg(long, value_enum, default_value = "skip-locked")]
        strategy: Strategy,

        /// Number of producer workers
        #[arg(long)]
        writers: Option<usize>,

        /// Sleep between offers, per writer (milliseconds)
        #[arg(long)]
        writer_delay_ms: Option<u64>,

        /// Number of consumer workers
        #[arg(long)]
        readers: Option<usize>,

        /// Consumer callback sleep inside the poll transaction (milliseconds)
        #[arg(long)]
        reader_delay_ms: Option<u64>,

        /// Maximum events per poll
        #[arg(long)]
        batch_size: Option<i64>,

        /// Wall-clock run length (seconds)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Cursor reset cadence for the cursor-bounded strategies
        #[arg(long)]
        reset_every: Option<u64>,

        /// Number of partitions for the partitioned strategy
        #[arg(long)]
        partitions: Option<usize>,

        /// Sleep between pseudo-vacuum cycles (seconds)
        #[arg(long)]
        vacuum_delay_secs: Option<u64>,

        /// Hold one transaction open for the whole run
        #[arg(long)]
        long_tx: Option<bool>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            eprintln!("Unknown log level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_cli(cli).await {
        tracing::error!("Error: {}", e);
        process::exit(1);
    }
}

/// Dispatch the parsed command against a config assembled from defaults,
/// environment, and CLI flags.
async fn run_cli(cli: Cli) -> pgqbuf::Result<()> {
    let mut config = BenchConfig::from_env()?;
    if let Some(dsn) = cli.dsn {
        config.dsn = dsn;
    }

    match cli.command {
        Commands::Install => admin(&config).await?.install().await,
        Commands::Uninstall => admin(&config).await?.uninstall().await,
        Commands::Purge => admin(&config).await?.truncate_all().await,
        Commands::Bench {
            strategy,
            writers,
            writer_delay_ms,
            readers,
            reader_delay_ms,
            batch_size,
            duration_secs,
            reset_every,
            partitions,
            vacuum_delay_secs,
            long_tx,
        } => {
            if let Some(writers) = writers {
                config.writer_count = writers;
            }
            if let Some(delay) = writer_delay_ms {
                config.writer_delay_ms = delay;
            }
            if let Some(readers) = readers {
                config.reader_count = readers;
            }
            if let Some(delay) = reader_delay_ms {
                config.reader_delay_ms = delay;
            }
            if let Some(batch_size) = batch_size {
                config.reader_batch_size = batch_size;
            }
            if let Some(duration) = duration_secs {
                config.duration_secs = duration;
            }
            if let Some(reset_every) = reset_every {
                config.reset_every = reset_every;
            }
            if let Some(partitions) = partitions {
                config.partition_count = partitions;
            }
            if let Some(delay) = vacuum_delay_secs {
                config.vacuum_delay_secs = delay;
            }
            if let Some(long_tx) = long_tx {
                config.long_tx_enabled = long_tx;
            }
            bench::run(config, strategy).await
        }
    }
}

async fn admin(config: &BenchConfig) -> pgqbuf::Result<Admin> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.dsn)
        .await?;
    Ok(Admin::new(pool))
}
