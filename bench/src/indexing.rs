//! Indexing lab: query latency on `students` before and after adding a
//! secondary index on `age`.
//!
//! Every phase opens its own connection and closes it when done:
//!
//! 1. delete the store file, create and populate `students`
//! 2. query without index
//! 3. `CREATE INDEX age_index ON students (age)`
//! 4. query with index

use crate::config::BenchConfig;
use crate::report::{print_query_timing, with_thousands, RunResult};
use crate::store::students::{
    remove_store_file, QueryResult, StudentColumn, StudentQuery, StudentStore,
};
use anyhow::{bail, Context, Result};
use lab_core::records::expected_age_matches;
use lab_core::stopwatch::try_time_operation;
use std::path::PathBuf;

pub const LAB_NAME: &str = "indexing";

#[derive(Debug, Clone)]
pub struct IndexingParams {
    pub path: PathBuf,
    pub student_count: u64,
    pub query: StudentQuery,
    pub column: StudentColumn,
}

impl IndexingParams {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            path: config.sqlite_path.clone(),
            student_count: config.student_count,
            query: StudentQuery::by_age(config.query_age),
            column: StudentColumn::Age,
        }
    }
}

/// Delete any previous store and create an empty `students` table.
pub fn setup(params: &IndexingParams) -> Result<()> {
    let existed = remove_store_file(&params.path)
        .with_context(|| format!("failed to delete {}", params.path.display()))?;
    if existed {
        println!("Database deleted successfully");
    }
    let store = StudentStore::open(&params.path)
        .with_context(|| format!("failed to open {}", params.path.display()))?;
    store.create_table().context("failed to create students table")?;
    store.close()?;
    Ok(())
}

fn populate_phase(params: &IndexingParams) -> Result<RunResult> {
    log::info!(
        "Populating {} students (this takes a while)...",
        with_thousands(params.student_count)
    );
    let store = StudentStore::open(&params.path)?;
    let timed = try_time_operation(|| store.populate(params.student_count))
        .context("failed to populate students")?;
    let count = store.count()?;
    store.close()?;

    if count != params.student_count {
        bail!(
            "students table holds {count} rows after populating {}",
            params.student_count
        );
    }
    println!(
        "Inserted {} students in {:.3}s",
        with_thousands(timed.value),
        timed.secs()
    );
    Ok(RunResult::new(LAB_NAME, "populate students", timed.value, timed.elapsed))
}

fn query_phase(params: &IndexingParams, label: &str) -> Result<(RunResult, QueryResult)> {
    let store = StudentStore::open(&params.path)?;
    let timed = try_time_operation(|| store.query(&params.query))
        .with_context(|| format!("query {label} failed"))?;
    for detail in store.explain(&params.query)? {
        log::debug!("Query plan ({label}): {detail}");
    }
    store.close()?;

    let result = RunResult::new(
        LAB_NAME,
        &format!("query {label}"),
        timed.value.count() as u64,
        timed.elapsed,
    );
    print_query_timing(label, &result);

    let expected = expected_age_matches(params.student_count, params.query.age);
    if result.rows != expected {
        bail!("Query {label} returned {} rows, expected {expected}", result.rows);
    }
    Ok((result, timed.value))
}

fn index_phase(params: &IndexingParams) -> Result<RunResult> {
    let store = StudentStore::open(&params.path)?;
    let timed = try_time_operation(|| store.create_index(params.column))
        .with_context(|| format!("failed to create index on {}", params.column))?;
    store.close()?;
    println!(
        "Created index {} in {:.3}s",
        params.column.index_name(),
        timed.secs()
    );
    Ok(RunResult::new(
        LAB_NAME,
        &format!("create {}", params.column.index_name()),
        0,
        timed.elapsed,
    ))
}

/// Run all four phases. Fails if either query's cardinality differs from
/// the age cycle's, or if the indexed query returns a different result set
/// than the unindexed one.
pub fn run(params: &IndexingParams) -> Result<Vec<RunResult>> {
    setup(params)?;

    let mut results = vec![populate_phase(params)?];

    let (without, rows_without) = query_phase(params, "without index")?;
    results.push(without);

    results.push(index_phase(params)?);

    let (with, rows_with) = query_phase(params, "with index")?;
    results.push(with);

    if rows_without.rows != rows_with.rows {
        bail!(
            "index changed the result set ({} rows without, {} with)",
            rows_without.count(),
            rows_with.count()
        );
    }

    Ok(results)
}
