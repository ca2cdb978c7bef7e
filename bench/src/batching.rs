//! Batching lab: insert throughput of the four strategies against one
//! `records` table.
//!
//! | Step | Strategy        | Records (defaults)        |
//! |------|-----------------|---------------------------|
//! | 1    | per-row commit  | 10,000                    |
//! | 2    | single commit   | 10,000                    |
//! | 3    | batched         | 1,000 batches × 1,000     |
//! | 4    | bulk load       | 1,000,000                 |

use crate::config::BenchConfig;
use crate::report::{print_insert_timing, RunResult};
use crate::store::RecordStore;
use crate::strategy::{populate, InsertStrategy};
use anyhow::{bail, Context, Result};
use lab_core::records::RecordGenerator;

pub const LAB_NAME: &str = "batching";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingParams {
    pub row_count: usize,
    pub batch_size: usize,
    pub batch_count: usize,
    pub bulk_count: usize,
    pub text_len: usize,
    pub seed: Option<u64>,
}

impl BatchingParams {
    pub fn from_config(config: &BenchConfig) -> Self {
        Self {
            row_count: config.row_count,
            batch_size: config.batch_size,
            batch_count: config.batch_count,
            bulk_count: config.bulk_count,
            text_len: config.text_len,
            seed: config.seed,
        }
    }

    /// The strategies in lab order with their record counts.
    pub fn steps(&self) -> [(InsertStrategy, usize); 4] {
        [
            (InsertStrategy::PerRowCommit, self.row_count),
            (InsertStrategy::SingleCommit, self.row_count),
            (
                InsertStrategy::Batched {
                    batch_size: self.batch_size,
                },
                self.batch_size.saturating_mul(self.batch_count),
            ),
            (InsertStrategy::BulkLoad, self.bulk_count),
        ]
    }

    fn generator(&self) -> RecordGenerator {
        match self.seed {
            Some(seed) => RecordGenerator::seeded(seed, self.text_len),
            None => RecordGenerator::from_entropy(self.text_len),
        }
    }
}

/// Insert `n` records with `strategy` and check the table grew by exactly
/// `n` rows.
pub fn run_step(
    store: &mut dyn RecordStore,
    generator: &mut RecordGenerator,
    strategy: InsertStrategy,
    n: usize,
) -> Result<RunResult> {
    let before = store.row_count()?;
    let timed = populate(store, n, generator, strategy)
        .with_context(|| format!("{strategy} insert failed"))?;
    let grew = store.row_count()?.saturating_sub(before);

    if grew != n as u64 || timed.value != n as u64 {
        bail!(
            "{strategy} reported {} rows, table grew by {grew} (expected {n})",
            timed.value
        );
    }

    let result = RunResult::new(LAB_NAME, &strategy.to_string(), timed.value, timed.elapsed);
    print_insert_timing(&result);
    Ok(result)
}

/// Set up an empty `records` table and run every step in order. The first
/// error aborts the lab; the connection is left as the error left it.
pub fn run(store: &mut dyn RecordStore, params: &BatchingParams) -> Result<Vec<RunResult>> {
    store
        .setup()
        .with_context(|| format!("failed to set up records table on {}", store.backend()))?;

    let mut generator = params.generator();
    let mut results = Vec::with_capacity(4);
    for (strategy, n) in params.steps() {
        results.push(run_step(store, &mut generator, strategy, n)?);
    }
    Ok(results)
}
