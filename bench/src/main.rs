//! Lab runner that prints timings as it goes and a summary report at the end.
//!
//! Usage:
//!   rdb-bench [indexing|batching|all] [--backend sqlite|postgres]
//!
//! Settings come from `RDB_*` environment variables (see `config.rs`); a
//! `.env` file in the working directory is loaded first.

use anyhow::{Context, Result};
use rdb_bench::batching::{self, BatchingParams};
use rdb_bench::config::BenchConfig;
use rdb_bench::indexing::{self, IndexingParams};
use rdb_bench::report::{print_report, with_thousands, RunResult};
use rdb_bench::store::postgres::PostgresStore;
use rdb_bench::store::sqlite::SqliteStore;
use rdb_bench::store::{Backend, RecordStore};
use std::env;
use std::process;

const USAGE: &str = "Usage: rdb-bench [indexing|batching|all] [--backend sqlite|postgres]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lab {
    Indexing,
    Batching,
    All,
}

fn parse_args(args: &[String]) -> Result<(Lab, Backend), String> {
    let mut lab = Lab::All;
    let mut backend = Backend::Postgres;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "indexing" => lab = Lab::Indexing,
            "batching" => lab = Lab::Batching,
            "all" => lab = Lab::All,
            "--backend" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "--backend requires a value".to_string())?;
                backend = value.parse()?;
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
        i += 1;
    }
    Ok((lab, backend))
}

fn open_record_store(backend: Backend, config: &BenchConfig) -> Result<Box<dyn RecordStore>> {
    let store: Box<dyn RecordStore> = match backend {
        Backend::Sqlite => Box::new(
            SqliteStore::open(&config.batch_sqlite_path).with_context(|| {
                format!("failed to open {}", config.batch_sqlite_path.display())
            })?,
        ),
        Backend::Postgres => Box::new(
            PostgresStore::connect(&config.pg_url).context("failed to connect to PostgreSQL")?,
        ),
    };
    Ok(store)
}

fn run_indexing(config: &BenchConfig) -> Result<Vec<RunResult>> {
    println!("\n── Indexing lab (SQLite) ──────────────────────────────");
    println!(
        "  Store: {}  Students: {}  Query: age = {}",
        config.sqlite_path.display(),
        with_thousands(config.student_count),
        config.query_age
    );
    indexing::run(&IndexingParams::from_config(config))
}

fn run_batching(config: &BenchConfig, backend: Backend) -> Result<Vec<RunResult>> {
    println!("\n── Batching lab ({backend}) ───────────────────────────");
    let params = BatchingParams::from_config(config);
    let mut store = open_record_store(backend, config)?;
    let results = batching::run(store.as_mut(), &params)?;
    store.close().context("failed to close connection")?;
    Ok(results)
}

fn run(lab: Lab, backend: Backend, config: &BenchConfig) -> Result<Vec<RunResult>> {
    let mut results = Vec::new();
    if matches!(lab, Lab::Indexing | Lab::All) {
        results.extend(run_indexing(config)?);
    }
    if matches!(lab, Lab::Batching | Lab::All) {
        results.extend(run_batching(config, backend)?);
    }
    Ok(results)
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return;
    }
    let (lab, backend) = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("{e}");
        eprintln!("{USAGE}");
        process::exit(1);
    });

    // A missing .env file is fine; every setting has a default.
    let _ = dotenvy::dotenv();

    let config = BenchConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {e:#}");
        process::exit(1);
    });

    lab_core::initialize_logger(config.log_level, config.log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {e}. Exiting.");
            process::exit(1);
        },
    );

    log::info!("Starting rdb-bench ({lab:?}, batching backend: {backend})");

    match run(lab, backend, &config) {
        Ok(results) => print_report(&results),
        Err(e) => {
            log::error!("Benchmark aborted: {e:#}");
            process::exit(1);
        }
    }
}
