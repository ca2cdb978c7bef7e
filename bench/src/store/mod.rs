//! Store abstraction and the common `RecordStore` trait.
//!
//! Two backends hold the `records` table used by the batching lab:
//! - [`sqlite::SqliteStore`]: embedded single-file store
//! - [`postgres::PostgresStore`]: client/server store
//!
//! The indexing lab's `students` table lives in [`students::StudentStore`].

pub mod postgres;
pub mod sqlite;
pub mod students;

use lab_core::records::GenericRecord;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("PostgreSQL error: {0}")]
    Postgres(::postgres::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("current transaction is aborted, commands ignored until end of transaction block")]
    AbortedTransaction,
    #[error("no transaction is open")]
    NoTransaction,
    #[error("a transaction is already open")]
    TransactionInProgress,
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
}

impl From<::postgres::Error> for StoreError {
    fn from(e: ::postgres::Error) -> Self {
        if e.code() == Some(&::postgres::error::SqlState::IN_FAILED_SQL_TRANSACTION) {
            StoreError::AbortedTransaction
        } else {
            StoreError::Postgres(e)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which relational store a [`RecordStore`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    /// Most rows a single multi-row `INSERT` may carry (two bind parameters
    /// per row, kept under each engine's parameter limit).
    pub fn max_rows_per_statement(self) -> usize {
        match self {
            // SQLITE_MAX_VARIABLE_NUMBER = 32766
            Backend::Sqlite => 10_000,
            // u16 parameter count in the wire protocol
            Backend::Postgres => 30_000,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            other => Err(format!("unknown backend `{other}` (expected sqlite or postgres)")),
        }
    }
}

/// Transaction state of one connection.
///
/// A statement error while `Active` moves the connection to `Failed`; from
/// there every statement is rejected until [`RecordStore::recover`] rolls
/// back. Nothing leaves `Failed` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    #[default]
    Idle,
    Active,
    Failed,
}

impl TxState {
    pub(crate) fn ensure_usable(self) -> StoreResult<()> {
        match self {
            TxState::Failed => Err(StoreError::AbortedTransaction),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_idle(self) -> StoreResult<()> {
        match self {
            TxState::Idle => Ok(()),
            TxState::Active => Err(StoreError::TransactionInProgress),
            TxState::Failed => Err(StoreError::AbortedTransaction),
        }
    }

    pub(crate) fn ensure_active(self) -> StoreResult<()> {
        match self {
            TxState::Active => Ok(()),
            TxState::Idle => Err(StoreError::NoTransaction),
            TxState::Failed => Err(StoreError::AbortedTransaction),
        }
    }

    /// Record the outcome of a statement issued in the current state.
    pub(crate) fn observe<T>(&mut self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(e) = &result {
            if *self == TxState::Active {
                log::error!("Statement failed inside a transaction, transaction aborted: {e}");
                *self = TxState::Failed;
            }
        }
        result
    }
}

/// Operations the batching lab performs against a `records` table.
///
/// Outside an explicit [`begin`](RecordStore::begin) every statement commits
/// on its own. Implementations must keep [`TxState`] accurate.
pub trait RecordStore {
    fn backend(&self) -> Backend;

    fn tx_state(&self) -> TxState;

    /// `CREATE TABLE IF NOT EXISTS records (...)`.
    fn create_table(&mut self) -> StoreResult<()>;

    /// Remove every row and restart the identity column.
    fn reset(&mut self) -> StoreResult<()>;

    fn row_count(&mut self) -> StoreResult<u64>;

    /// Run arbitrary SQL (one or more statements, no results).
    fn execute(&mut self, sql: &str) -> StoreResult<()>;

    fn begin(&mut self) -> StoreResult<()>;

    fn commit(&mut self) -> StoreResult<()>;

    /// Roll back an open or aborted transaction. No-op when idle.
    fn recover(&mut self) -> StoreResult<()>;

    /// One `INSERT` statement for one record.
    fn insert_row(&mut self, record: &GenericRecord) -> StoreResult<()>;

    /// Multi-row `INSERT ... VALUES (..), (..)`; split only when the
    /// backend's parameter limit requires it.
    fn insert_rows(&mut self, records: &[GenericRecord]) -> StoreResult<()>;

    /// Stream records through the backend's bulk channel. Runs as its own
    /// unit of work, so it requires an idle connection.
    fn bulk_load(&mut self, records: &[GenericRecord]) -> StoreResult<u64>;

    /// Release the connection, surfacing any error from closing it.
    fn close(self: Box<Self>) -> StoreResult<()>;

    /// Ensure the table exists and starts empty.
    fn setup(&mut self) -> StoreResult<()> {
        self.create_table()?;
        self.reset()
    }
}

/// Placeholder style of a backend's bind parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Numbered,
}

/// `INSERT INTO records (num, txt) VALUES (..), (..)` for `rows` rows.
pub(crate) fn multi_row_insert_sql(rows: usize, placeholder: Placeholder) -> String {
    let mut sql = String::with_capacity(40 + rows * 12);
    sql.push_str("INSERT INTO records (num, txt) VALUES ");
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        match placeholder {
            Placeholder::Question => sql.push_str("(?, ?)"),
            Placeholder::Numbered => {
                sql.push_str(&format!("(${}, ${})", row * 2 + 1, row * 2 + 2));
            }
        }
    }
    sql
}
