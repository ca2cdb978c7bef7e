//! Insertion strategies compared by the batching lab.
//!
//! | Strategy        | Statements per record | Commits            |
//! |-----------------|-----------------------|--------------------|
//! | `PerRowCommit`  | 1                     | 1 per record       |
//! | `SingleCommit`  | 1                     | 1 at the end       |
//! | `Batched`       | 1 per batch           | 1 per batch        |
//! | `BulkLoad`      | none (bulk channel)   | 1 for the stream   |

use crate::store::{RecordStore, StoreError, StoreResult};
use lab_core::records::{GenericRecord, RecordGenerator};
use lab_core::stopwatch::{try_time_operation, Timed};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    PerRowCommit,
    SingleCommit,
    Batched { batch_size: usize },
    BulkLoad,
}

impl fmt::Display for InsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertStrategy::PerRowCommit => write!(f, "per-row commit"),
            InsertStrategy::SingleCommit => write!(f, "single commit"),
            InsertStrategy::Batched { batch_size } => write!(f, "batched ({batch_size}/batch)"),
            InsertStrategy::BulkLoad => write!(f, "bulk load"),
        }
    }
}

/// Write `records` with `strategy`. Returns the number of rows inserted.
///
/// No retry: the first error is returned as-is, and a transaction that was
/// open at that point stays aborted until the caller recovers it.
pub fn insert_with(
    store: &mut dyn RecordStore,
    records: &[GenericRecord],
    strategy: InsertStrategy,
) -> StoreResult<u64> {
    match strategy {
        InsertStrategy::PerRowCommit => {
            for record in records {
                store.begin()?;
                store.insert_row(record)?;
                store.commit()?;
            }
            Ok(records.len() as u64)
        }
        InsertStrategy::SingleCommit => {
            store.begin()?;
            for record in records {
                store.insert_row(record)?;
            }
            store.commit()?;
            Ok(records.len() as u64)
        }
        InsertStrategy::Batched { batch_size } => {
            if batch_size == 0 {
                return Err(StoreError::InvalidBatchSize);
            }
            let batches = records.len().div_ceil(batch_size);
            for (i, batch) in records.chunks(batch_size).enumerate() {
                store.begin()?;
                store.insert_rows(batch)?;
                store.commit()?;
                log::debug!("Committed batch {}/{batches} ({} rows)", i + 1, batch.len());
            }
            Ok(records.len() as u64)
        }
        InsertStrategy::BulkLoad => store.bulk_load(records),
    }
}

/// Generate `n` records, then time writing them with `strategy`.
///
/// Generation happens before the stopwatch starts, so only store work is
/// measured.
pub fn populate(
    store: &mut dyn RecordStore,
    n: usize,
    generator: &mut RecordGenerator,
    strategy: InsertStrategy,
) -> StoreResult<Timed<u64>> {
    let records = generator.generate(n);
    log::info!(
        "Inserting {n} records into {} using {strategy}",
        store.backend()
    );
    try_time_operation(|| insert_with(store, &records, strategy))
}
