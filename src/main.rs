//! tablestream: stream, batch and paginate rows of a large table.
//!
//! # Usage
//!
//! ```bash
//! tablestream --data-dir ./data seed user_data.csv
//! tablestream batches --batch-size 50 --min-age 25
//! tablestream paginate --page-size 100 --prefetch 4 --output json
//! tablestream average-age
//! ```
//!
//! Environment variables can also be used:
//! - `TABLESTREAM_DATA_DIR`, `TABLESTREAM_DB`: Database location
//! - `TABLESTREAM_POOL_SIZE`: Pooled connections (0 = direct)
//! - `RUST_LOG`: Log filter (overrides `--log-level`)

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use tablestream::config::ConnectionConfig;
use tablestream::observability::metrics::init_metrics;
use tablestream::observability::tracing::init_tracing;
use tablestream::storage::provider::{
    ConnectionGuard, ConnectionProvider, PooledProvider, SqliteProvider, TrackedProvider,
};
use tablestream::storage::seed;
use tablestream::stream::{
    drain, Aggregator, BatchFilter, BatchStream, LineSink, OutputFormat, Paginator, RowStream,
    Sink,
};
use tablestream::{StreamError, TableSchema};

/// Bounded-memory streaming over a SQLite table.
#[derive(Parser)]
#[command(name = "tablestream")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionConfig,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TABLESTREAM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Create the user_data table and load users from a CSV file
    Seed {
        /// CSV file with a name,email,age header
        csv: PathBuf,
    },
    /// Stream rows one at a time in key order
    Stream {
        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Stream rows in batches and print users older than --min-age
    Batches {
        /// Rows per batch
        #[arg(short, long, default_value_t = 50)]
        batch_size: usize,
        /// Only rows with an age strictly greater than this pass
        #[arg(long, default_value_t = 25)]
        min_age: i64,
    },
    /// Fetch pages of rows with LIMIT/OFFSET queries
    Paginate {
        /// Rows per page
        #[arg(short, long, default_value_t = 100)]
        page_size: i64,
        /// Fetch up to this many pages concurrently
        #[arg(long)]
        prefetch: Option<usize>,
    },
    /// Print the average user age
    AverageAge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);
    init_metrics();

    std::fs::create_dir_all(&cli.connection.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            cli.connection.data_dir.display()
        )
    })?;

    tracing::info!(
        endpoint = %cli.connection.endpoint(),
        path = %cli.connection.database_path().display(),
        pool_size = cli.connection.pool_size,
        "Using database"
    );

    // Only seeding may create or write the database.
    let read_only = !matches!(cli.command, Commands::Seed { .. });

    let result = if cli.connection.pool_size > 0 {
        let pool = PooledProvider::from_config(&cli.connection, read_only)?;
        run(Arc::new(TrackedProvider::new(pool)), cli.command, cli.output).await
    } else {
        let mut direct = SqliteProvider::from_config(&cli.connection);
        if read_only {
            direct = direct.read_only();
        }
        run(Arc::new(TrackedProvider::new(direct)), cli.command, cli.output).await
    };

    match result {
        Err(e)
            if e
                .downcast_ref::<StreamError>()
                .is_some_and(StreamError::is_broken_pipe) =>
        {
            tracing::debug!("Output closed by reader");
            Ok(())
        }
        other => other,
    }
}

async fn run<P: ConnectionProvider>(
    provider: Arc<TrackedProvider<P>>,
    command: Commands,
    output: OutputFormat,
) -> Result<()> {
    let schema = TableSchema::user_data();

    match command {
        Commands::Paginate {
            page_size,
            prefetch: Some(depth),
        } => {
            let paginator = Paginator::new(Arc::clone(&provider), &schema);
            let mut pages = Box::pin(paginator.prefetch_pages(page_size, depth)?);
            let mut sink = LineSink::new(io::stdout(), output);
            while let Some(page) = pages.next().await {
                if let Err(e) = page.and_then(|page| sink.accept(page)) {
                    Sink::<tablestream::stream::Page>::abort(&mut sink, &e);
                    return Err(e.into());
                }
            }
            Sink::<tablestream::stream::Page>::finish(&mut sink)?;
        }
        command => {
            let provider = Arc::clone(&provider);
            tokio::task::spawn_blocking(move || run_blocking(&provider, &schema, command, output))
                .await
                .context("command task failed")??;
        }
    }

    tracing::debug!(
        opened = provider.opened(),
        closed = provider.closed(),
        "Connections released"
    );
    Ok(())
}

fn run_blocking<P: ConnectionProvider>(
    provider: &Arc<TrackedProvider<P>>,
    schema: &TableSchema,
    command: Commands,
    output: OutputFormat,
) -> Result<()> {
    let stdout = io::stdout().lock();

    match command {
        Commands::Seed { csv } => {
            let guard = ConnectionGuard::open(&**provider)?;
            seed::create_table(guard.connection())?;
            let report = seed::insert_csv(guard.connection(), &csv)
                .with_context(|| format!("failed to seed from {}", csv.display()))?;
            tracing::info!(
                inserted = report.inserted,
                skipped = report.skipped,
                "Seeded user_data"
            );
        }
        Commands::Stream { limit } => {
            let rows = RowStream::new(Arc::clone(provider), schema)?.stream();
            let mut sink = LineSink::new(stdout, output);
            match limit {
                Some(n) => drain(rows.take(n), &mut sink)?,
                None => drain(rows, &mut sink)?,
            };
        }
        Commands::Batches {
            batch_size,
            min_age,
        } => {
            let batches = BatchStream::new(Arc::clone(provider), schema)?.stream_batches(batch_size)?;
            let filter = BatchFilter::older_than(schema, min_age)?;
            let mut sink = LineSink::new(stdout, output);
            filter.run(batches, &mut sink)?;
        }
        Commands::Paginate { page_size, .. } => {
            let pages = Paginator::new(Arc::clone(provider), schema).lazy_paginate(page_size)?;
            let mut sink = LineSink::new(stdout, output);
            drain(pages, &mut sink)?;
        }
        Commands::AverageAge => {
            let average = Aggregator::new(Arc::clone(provider), schema)?.average_age()?;
            let mut sink = LineSink::new(stdout, OutputFormat::Text);
            sink.accept(format!("Average age of users: {average:.2}"))?;
            Sink::<String>::finish(&mut sink)?;
        }
    }
    Ok(())
}
