//! measure-ingest command line entry point

use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

use mi_core::{CollisionPolicy, IngestOptions};
use mi_data::{ingest_table, load_table, sample, Store};

#[derive(Parser, Debug)]
#[command(name = "measure-ingest")]
#[command(about = "Load TDMS measurements into an embedded store and sample CSV files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace a store table with the channels of a TDMS file
    Ingest {
        /// TDMS file to read
        source: PathBuf,

        /// Store file, or :memory:
        #[arg(long, default_value = "measurements.db")]
        store: String,

        /// Table to replace
        #[arg(long, default_value = "measurements")]
        table: String,

        /// Keep at most this many rows
        #[arg(long)]
        limit: Option<usize>,

        /// What to do when two channels normalize to the same column name
        #[arg(long, value_enum, default_value_t = OnCollision::Error)]
        on_collision: OnCollision,

        /// Print the first N rows of the table before writing it
        #[arg(long, value_name = "N")]
        preview: Option<usize>,
    },

    /// Print every row of a CSV file as JSON
    Sample {
        /// CSV file to read
        csv: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OnCollision {
    Error,
    Suffix,
}

impl From<OnCollision> for CollisionPolicy {
    fn from(value: OnCollision) -> Self {
        match value {
            OnCollision::Error => CollisionPolicy::Error,
            OnCollision::Suffix => CollisionPolicy::Suffix,
        }
    }
}

fn path_bytes(path: &Path) -> Result<&[u8]> {
    let text = path
        .to_str()
        .with_context(|| format!("path {} is not valid UTF-8", path.display()))?;
    Ok(text.as_bytes())
}

fn run_ingest(source: &Path, options: &IngestOptions, preview: Option<usize>) -> Result<()> {
    let table = load_table(path_bytes(source)?, options.collision_policy)
        .with_context(|| format!("Failed to load {}", source.display()))?;

    if let Some(rows) = preview {
        let head = table.head(rows);
        println!("{}", pretty_format_batches(&[head.into_batch()])?);
    }

    let mut store = Store::open(&options.store_path)
        .with_context(|| format!("Failed to open store {}", options.store_path))?;
    let report = ingest_table(&mut store, &table, options)
        .with_context(|| format!("Failed to write table {}", options.table_name))?;

    info!(
        "Ingested {} of {} rows into {}.{}",
        report.rows_written, report.rows_read, report.store_path, report.table_name
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match args.command {
        Command::Ingest {
            source,
            store,
            table,
            limit,
            on_collision,
            preview,
        } => {
            let options = IngestOptions::new(store, table)
                .with_row_limit(limit)
                .with_collision_policy(on_collision.into());
            run_ingest(&source, &options, preview)
        }
        Command::Sample { csv } => {
            let json = sample(path_bytes(&csv)?)
                .with_context(|| format!("Failed to sample {}", csv.display()))?;
            println!("{}", json);
            Ok(())
        }
    }
}
