//! Integration tests: verify both labs end to end against file-backed SQLite
//! stores, plus the aborted-transaction pitfall and its recovery.
//!
//! PostgreSQL tests are ignored by default; run them with
//! `RDB_TEST_PG_URL="host=... user=..." cargo test -- --ignored`.

use lab_core::records::{expected_age_matches, RecordGenerator};
use rdb_bench::batching::{self, BatchingParams};
use rdb_bench::indexing::{self, IndexingParams};
use rdb_bench::store::postgres::PostgresStore;
use rdb_bench::store::sqlite::SqliteStore;
use rdb_bench::store::students::{StudentColumn, StudentQuery, StudentStore};
use rdb_bench::store::{RecordStore, StoreError, TxState};
use rdb_bench::strategy::{insert_with, populate, InsertStrategy};
use tempfile::TempDir;

fn sqlite_records_store(dir: &TempDir) -> SqliteStore {
    let mut store = SqliteStore::open(&dir.path().join("records.db")).expect("open");
    store.setup().expect("setup");
    store
}

fn small_batching_params() -> BatchingParams {
    BatchingParams {
        row_count: 40,
        batch_size: 25,
        batch_count: 4,
        bulk_count: 300,
        text_len: 16,
        seed: Some(11),
    }
}

fn student_store(dir: &TempDir, n: u64) -> StudentStore {
    let store = StudentStore::open(&dir.path().join("students.db")).expect("open");
    store.create_table().expect("create_table");
    store.populate(n).expect("populate");
    store
}

// ── Batching lab ─────────────────────────────────────────────────────

#[test]
fn batching_lab_runs_every_strategy() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let params = small_batching_params();

    let results = batching::run(&mut store, &params).unwrap();

    let rows: Vec<u64> = results.iter().map(|r| r.rows).collect();
    assert_eq!(rows, vec![40, 40, 100, 300]);
    assert_eq!(store.row_count().unwrap(), 480);
    assert_eq!(store.tx_state(), TxState::Idle);
}

#[test]
fn setup_starts_every_run_from_an_empty_table() {
    let dir = TempDir::new().unwrap();
    let params = small_batching_params();

    let mut store = sqlite_records_store(&dir);
    batching::run(&mut store, &params).unwrap();
    Box::new(store).close().unwrap();

    let mut store = SqliteStore::open(&dir.path().join("records.db")).unwrap();
    store.setup().unwrap();
    assert_eq!(store.row_count().unwrap(), 0);

    // Identity restarts too.
    let records = RecordGenerator::seeded(1, 8).generate(1);
    insert_with(&mut store, &records, InsertStrategy::SingleCommit).unwrap();
    let id: i64 = store
        .connection()
        .query_row("SELECT id FROM records", [], |r| r.get(0))
        .unwrap();
    assert_eq!(id, 1);
}

#[test]
fn batched_insert_handles_short_final_batch() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let records = RecordGenerator::seeded(5, 10).generate(1_001);

    let inserted =
        insert_with(&mut store, &records, InsertStrategy::Batched { batch_size: 100 }).unwrap();
    assert_eq!(inserted, 1_001);
    assert_eq!(store.row_count().unwrap(), 1_001);
}

#[test]
fn batched_insert_splits_oversized_statements() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let records = RecordGenerator::seeded(5, 4).generate(25_000);

    insert_with(
        &mut store,
        &records,
        InsertStrategy::Batched { batch_size: 25_000 },
    )
    .unwrap();
    assert_eq!(store.row_count().unwrap(), 25_000);
}

#[test]
fn stored_values_match_generated_records() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let records = RecordGenerator::seeded(8, 64).generate(3);

    insert_with(&mut store, &records, InsertStrategy::BulkLoad).unwrap();

    let mut stmt = store
        .connection()
        .prepare("SELECT num, txt FROM records ORDER BY id")
        .unwrap();
    let stored: Vec<(i64, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let expected: Vec<(i64, String)> = records.into_iter().map(|r| (r.num, r.txt)).collect();
    assert_eq!(stored, expected);
}

#[test]
fn single_commit_beats_per_row_commit() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let mut generator = RecordGenerator::seeded(2, 64);

    let per_row = populate(&mut store, 500, &mut generator, InsertStrategy::PerRowCommit).unwrap();
    let after_per_row = store.row_count().unwrap();
    let single = populate(&mut store, 500, &mut generator, InsertStrategy::SingleCommit).unwrap();
    let after_single = store.row_count().unwrap();

    assert_eq!(after_per_row, 500);
    assert_eq!(after_single - after_per_row, 500);
    assert!(
        single.elapsed < per_row.elapsed,
        "single commit {:?} vs per-row commit {:?}",
        single.elapsed,
        per_row.elapsed
    );
}

#[test]
fn bulk_load_is_no_slower_than_thousand_row_batches() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let mut generator = RecordGenerator::seeded(4, 64);

    let batched = populate(
        &mut store,
        50_000,
        &mut generator,
        InsertStrategy::Batched { batch_size: 1_000 },
    )
    .unwrap();
    let after_batched = store.row_count().unwrap();
    let bulk = populate(&mut store, 50_000, &mut generator, InsertStrategy::BulkLoad).unwrap();
    let after_bulk = store.row_count().unwrap();

    assert_eq!(after_batched, 50_000);
    assert_eq!(after_bulk - after_batched, 50_000);
    assert!(
        bulk.elapsed <= batched.elapsed,
        "bulk {:?} vs batched {:?}",
        bulk.elapsed,
        batched.elapsed
    );
}

#[test]
fn bulk_load_spans_several_statements_with_a_short_tail() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let records = RecordGenerator::seeded(12, 4).generate(23_456);

    assert_eq!(store.bulk_load(&records).unwrap(), 23_456);
    assert_eq!(store.row_count().unwrap(), 23_456);
    let last: i64 = store
        .connection()
        .query_row("SELECT num FROM records ORDER BY id DESC LIMIT 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(last, records[23_455].num);
}

// ── Aborted transactions ─────────────────────────────────────────────

#[test]
fn failed_statement_aborts_transaction_until_recovered() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    let records = RecordGenerator::seeded(6, 8).generate(3);

    store.begin().unwrap();
    store.insert_row(&records[0]).unwrap();
    let err = store.execute("INSERT INTO no_such_table VALUES (1)").unwrap_err();
    assert!(matches!(err, StoreError::Sqlite(_)));
    assert_eq!(store.tx_state(), TxState::Failed);

    // Resuming without recovery keeps failing.
    assert!(matches!(
        store.insert_row(&records[1]),
        Err(StoreError::AbortedTransaction)
    ));
    assert!(matches!(store.commit(), Err(StoreError::AbortedTransaction)));
    assert!(matches!(
        insert_with(&mut store, &records, InsertStrategy::PerRowCommit),
        Err(StoreError::AbortedTransaction)
    ));

    store.recover().unwrap();
    assert_eq!(store.tx_state(), TxState::Idle);
    assert_eq!(store.row_count().unwrap(), 0, "uncommitted row rolled back");

    insert_with(&mut store, &records, InsertStrategy::SingleCommit).unwrap();
    assert_eq!(store.row_count().unwrap(), 3);
}

#[test]
fn failed_bulk_statement_rolls_back_the_whole_load() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    store
        .execute(
            "CREATE TRIGGER reject_negative_num BEFORE INSERT ON records
             WHEN NEW.num < 0
             BEGIN SELECT RAISE(ABORT, 'negative num'); END;",
        )
        .unwrap();
    let mut records = RecordGenerator::seeded(9, 8).generate(20);
    records[15].num = -1;

    let err = store.bulk_load(&records).unwrap_err();
    assert!(err.to_string().contains("negative num"), "{err}");
    assert_eq!(store.tx_state(), TxState::Idle);
    assert!(store.connection().is_autocommit());
    assert_eq!(store.row_count().unwrap(), 0);

    records[15].num = 1;
    assert_eq!(store.bulk_load(&records).unwrap(), 20);
    assert_eq!(store.row_count().unwrap(), 20);
}

#[test]
fn failed_bulk_commit_leaves_no_open_transaction() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    // A deferred foreign key is only checked at COMMIT.
    store
        .execute(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE owners (id INTEGER PRIMARY KEY);
             CREATE TABLE claims (
                 owner INTEGER REFERENCES owners (id) DEFERRABLE INITIALLY DEFERRED
             );
             CREATE TRIGGER claim_negative_num AFTER INSERT ON records
             WHEN NEW.num < 0
             BEGIN INSERT INTO claims (owner) VALUES (NEW.num); END;",
        )
        .unwrap();
    let mut records = RecordGenerator::seeded(10, 8).generate(5);
    records[2].num = -7;

    let err = store.bulk_load(&records).unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"), "{err}");
    assert_eq!(store.tx_state(), TxState::Idle);
    assert!(store.connection().is_autocommit());
    assert_eq!(store.row_count().unwrap(), 0);

    store.recover().unwrap();
    store.begin().unwrap();
    store.insert_row(&records[0]).unwrap();
    store.commit().unwrap();
    assert_eq!(store.row_count().unwrap(), 1);
}

#[test]
fn recover_on_idle_connection_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);
    store.recover().unwrap();
    assert_eq!(store.tx_state(), TxState::Idle);
}

#[test]
fn transaction_misuse_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);

    assert!(matches!(store.commit(), Err(StoreError::NoTransaction)));
    store.begin().unwrap();
    assert!(matches!(store.begin(), Err(StoreError::TransactionInProgress)));
    assert!(matches!(
        store.bulk_load(&[]),
        Err(StoreError::TransactionInProgress)
    ));
    store.commit().unwrap();
}

#[test]
fn errors_outside_a_transaction_do_not_abort() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_records_store(&dir);

    assert!(store.execute("SELECT * FROM no_such_table").is_err());
    assert_eq!(store.tx_state(), TxState::Idle);
    assert_eq!(store.row_count().unwrap(), 0);
}

// ── Indexing lab ─────────────────────────────────────────────────────

#[test]
fn indexing_lab_reports_all_phases() {
    let dir = TempDir::new().unwrap();
    let params = IndexingParams {
        path: dir.path().join("test_database.db"),
        student_count: 6_000,
        query: StudentQuery::by_age(20),
        column: StudentColumn::Age,
    };

    let results = indexing::run(&params).unwrap();

    let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "populate students",
            "query without index",
            "create age_index",
            "query with index"
        ]
    );
    assert_eq!(results[0].rows, 6_000);
    assert_eq!(results[1].rows, 100);
    assert_eq!(results[3].rows, 100);

    // Running again starts from a fresh file rather than failing on the
    // existing table and index.
    let again = indexing::run(&params).unwrap();
    assert_eq!(again[3].rows, 100);
}

#[test]
fn indexing_lab_fails_on_unexpected_cardinality() {
    let dir = TempDir::new().unwrap();
    let params = IndexingParams {
        path: dir.path().join("test_database.db"),
        student_count: 600,
        query: StudentQuery {
            age: 20,
            name_prefix: "Pupil".to_string(),
        },
        column: StudentColumn::Age,
    };

    let err = indexing::run(&params).unwrap_err();
    assert!(format!("{err:#}").contains("expected 10"), "{err:#}");
}

#[test]
fn query_cardinality_matches_age_cycle() {
    let dir = TempDir::new().unwrap();
    let total = 1_234;
    let store = student_store(&dir, total);

    for age in 0..60 {
        let result = store.query(&StudentQuery::by_age(age)).unwrap();
        assert_eq!(
            result.count() as u64,
            expected_age_matches(total, age),
            "age {age}"
        );
        assert!(result.rows.iter().all(|s| s.age == age));
        let floor = total / 60;
        assert!(result.count() as u64 == floor || result.count() as u64 == floor + 1);
    }
}

#[test]
fn index_leaves_results_unchanged_and_is_used() {
    let dir = TempDir::new().unwrap();
    let store = student_store(&dir, 2_000);
    let query = StudentQuery::by_age(7);

    let before = store.query(&query).unwrap();
    store.create_index(StudentColumn::Age).unwrap();
    let after = store.query(&query).unwrap();

    assert_eq!(before.rows, after.rows);
    let plan = store.explain(&query).unwrap().join("\n");
    assert!(plan.contains("age_index"), "plan: {plan}");
}

#[test]
fn creating_an_existing_index_fails_deterministically() {
    let dir = TempDir::new().unwrap();
    let store = student_store(&dir, 100);

    store.create_index(StudentColumn::Age).unwrap();
    for _ in 0..2 {
        let err = store.create_index(StudentColumn::Age).unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
    }
    // A different column is still fresh.
    store.create_index(StudentColumn::Name).unwrap();
}

#[test]
#[ignore = "populates 20,000,000 rows; run with --ignored"]
fn full_scale_index_scenario() {
    let dir = TempDir::new().unwrap();
    let params = IndexingParams {
        path: dir.path().join("test_database.db"),
        student_count: 20_000_000,
        query: StudentQuery::by_age(20),
        column: StudentColumn::Age,
    };

    let results = indexing::run(&params).unwrap();
    assert_eq!(results[1].rows, 333_333);
    assert_eq!(results[3].rows, 333_333);
}

// ── PostgreSQL ───────────────────────────────────────────────────────

fn pg_store() -> PostgresStore {
    let url = std::env::var("RDB_TEST_PG_URL").expect("RDB_TEST_PG_URL must be set");
    let mut store = PostgresStore::connect(&url).expect("connect");
    store.setup().expect("setup");
    store
}

#[test]
#[ignore = "requires a PostgreSQL server (RDB_TEST_PG_URL)"]
fn postgres_batching_lab_runs_every_strategy() {
    let mut store = pg_store();
    let results = batching::run(&mut store, &small_batching_params()).unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(store.row_count().unwrap(), 480);
}

#[test]
#[ignore = "requires a PostgreSQL server (RDB_TEST_PG_URL)"]
fn postgres_aborted_transaction_needs_recovery() {
    let mut store = pg_store();
    let records = RecordGenerator::seeded(6, 8).generate(2);

    store.begin().unwrap();
    store.insert_row(&records[0]).unwrap();
    assert!(store.execute("SELECT * FROM no_such_table").is_err());
    assert_eq!(store.tx_state(), TxState::Failed);
    assert!(matches!(
        store.insert_row(&records[1]),
        Err(StoreError::AbortedTransaction)
    ));

    store.recover().unwrap();
    assert_eq!(store.row_count().unwrap(), 0);
    Box::new(store).close().unwrap();
}
