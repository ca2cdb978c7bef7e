//! SQLite backend for the `records` table (via rusqlite).
//!
//! Configuration: WAL journal, FULL synchronous so every commit is a
//! durability sync, like a server store would do.

use super::{
    multi_row_insert_sql, Backend, Placeholder, RecordStore, StoreError, StoreResult, TxState,
};
use lab_core::records::GenericRecord;
use rusqlite::{params, params_from_iter, Connection, ToSql};
use std::path::Path;

const CREATE_RECORDS_SQL: &str = "CREATE TABLE IF NOT EXISTS records (
    id  INTEGER PRIMARY KEY AUTOINCREMENT,
    num INTEGER,
    txt TEXT
);";

const RESET_RECORDS_SQL: &str = "DELETE FROM records;
     DELETE FROM sqlite_sequence WHERE name = 'records';";

const INSERT_RECORD_SQL: &str = "INSERT INTO records (num, txt) VALUES (?1, ?2)";

/// Configure a connection for durable, file-backed benchmarking.
pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA cache_size = -64000;
         PRAGMA temp_store = MEMORY;",
    )
}

pub struct SqliteStore {
    conn: Connection,
    tx: TxState,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        log::debug!("Opened SQLite store at {}", path.display());
        Ok(Self {
            conn,
            tx: TxState::Idle,
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            tx: TxState::Idle,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Insert every record through multi-row statements of the largest size the
/// variable limit allows. The full-size statement is prepared once and
/// reused from the cache; only a short tail gets a statement of its own.
fn load_chunked(conn: &Connection, records: &[GenericRecord]) -> rusqlite::Result<u64> {
    let chunk_rows = Backend::Sqlite.max_rows_per_statement();
    let full_sql = multi_row_insert_sql(chunk_rows, Placeholder::Question);
    let mut inserted = 0u64;
    for chunk in records.chunks(chunk_rows) {
        let mut stmt = if chunk.len() == chunk_rows {
            conn.prepare_cached(&full_sql)?
        } else {
            conn.prepare_cached(&multi_row_insert_sql(chunk.len(), Placeholder::Question))?
        };
        let values = chunk
            .iter()
            .flat_map(|r| [&r.num as &dyn ToSql, &r.txt as &dyn ToSql]);
        inserted += stmt.execute(params_from_iter(values))? as u64;
    }
    Ok(inserted)
}

impl RecordStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn tx_state(&self) -> TxState {
        self.tx
    }

    fn create_table(&mut self) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self.conn.execute_batch(CREATE_RECORDS_SQL).map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn reset(&mut self) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self.conn.execute_batch(RESET_RECORDS_SQL).map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn row_count(&mut self) -> StoreResult<u64> {
        self.tx.ensure_usable()?;
        let result = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn execute(&mut self, sql: &str) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self.conn.execute_batch(sql).map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.tx.ensure_idle()?;
        self.conn.execute_batch("BEGIN")?;
        self.tx = TxState::Active;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.tx.ensure_active()?;
        let result = self.conn.execute_batch("COMMIT").map_err(StoreError::from);
        let result = self.tx.observe(result);
        if result.is_ok() {
            self.tx = TxState::Idle;
        }
        result
    }

    fn recover(&mut self) -> StoreResult<()> {
        if self.tx == TxState::Idle {
            return Ok(());
        }
        log::warn!("Rolling back {:?} transaction", self.tx);
        // A failing COMMIT may already have ended the transaction.
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        self.tx = TxState::Idle;
        Ok(())
    }

    fn insert_row(&mut self, record: &GenericRecord) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        // `execute` prepares the statement anew on every call.
        let result = self
            .conn
            .execute(INSERT_RECORD_SQL, params![record.num, record.txt])
            .map(|_| ())
            .map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn insert_rows(&mut self, records: &[GenericRecord]) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        for chunk in records.chunks(Backend::Sqlite.max_rows_per_statement()) {
            let sql = multi_row_insert_sql(chunk.len(), Placeholder::Question);
            let values = chunk
                .iter()
                .flat_map(|r| [&r.num as &dyn ToSql, &r.txt as &dyn ToSql]);
            let result = self
                .conn
                .execute(&sql, params_from_iter(values))
                .map(|_| ())
                .map_err(StoreError::from);
            self.tx.observe(result)?;
        }
        Ok(())
    }

    fn bulk_load(&mut self, records: &[GenericRecord]) -> StoreResult<u64> {
        self.tx.ensure_idle()?;
        self.conn.execute_batch("BEGIN")?;
        let result = load_chunked(&self.conn, records)
            .and_then(|inserted| self.conn.execute_batch("COMMIT").map(|_| inserted));
        match result {
            Ok(inserted) => Ok(inserted),
            Err(e) => {
                // A failed COMMIT (deferred constraint, SQLITE_BUSY) can leave
                // the transaction open.
                if !self.conn.is_autocommit() {
                    if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                        log::error!("Rollback after failed bulk load failed: {rollback}");
                        self.tx = TxState::Failed;
                    }
                }
                Err(e.into())
            }
        }
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}
