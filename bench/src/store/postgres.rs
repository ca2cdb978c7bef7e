//! PostgreSQL backend for the `records` table (via the synchronous
//! `postgres` client).
//!
//! The client runs in autocommit mode; transactions are opened with an
//! explicit `BEGIN` so a failed statement leaves the session in the same
//! aborted state a notebook user would run into (SQLSTATE 25P02).

use super::{
    multi_row_insert_sql, Backend, Placeholder, RecordStore, StoreError, StoreResult, TxState,
};
use ::postgres::binary_copy::BinaryCopyInWriter;
use ::postgres::types::{ToSql, Type};
use ::postgres::{Client, NoTls};
use lab_core::records::GenericRecord;

const CREATE_RECORDS_SQL: &str =
    "CREATE TABLE IF NOT EXISTS records (id serial PRIMARY KEY, num BIGINT, txt VARCHAR);";

const RESET_RECORDS_SQL: &str = "TRUNCATE records RESTART IDENTITY;";

const INSERT_RECORD_SQL: &str = "INSERT INTO records (num, txt) VALUES ($1, $2)";

const COPY_RECORDS_SQL: &str = "COPY records (num, txt) FROM STDIN BINARY";

pub struct PostgresStore {
    client: Client,
    tx: TxState,
}

impl PostgresStore {
    /// Connect with a libpq-style string, e.g.
    /// `host=localhost port=5432 dbname=rdb_lab_batch_inserts user=postgres`.
    pub fn connect(conn_info: &str) -> StoreResult<Self> {
        let client = Client::connect(conn_info, NoTls)?;
        log::debug!("Connected to PostgreSQL");
        Ok(Self {
            client,
            tx: TxState::Idle,
        })
    }
}

impl RecordStore for PostgresStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn tx_state(&self) -> TxState {
        self.tx
    }

    fn create_table(&mut self) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self
            .client
            .batch_execute(CREATE_RECORDS_SQL)
            .map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn reset(&mut self) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self
            .client
            .batch_execute(RESET_RECORDS_SQL)
            .map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn row_count(&mut self) -> StoreResult<u64> {
        self.tx.ensure_usable()?;
        let result = self
            .client
            .query_one("SELECT COUNT(*) FROM records", &[])
            .map(|row| row.get::<_, i64>(0) as u64)
            .map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn execute(&mut self, sql: &str) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self.client.batch_execute(sql).map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.tx.ensure_idle()?;
        self.client.batch_execute("BEGIN")?;
        self.tx = TxState::Active;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.tx.ensure_active()?;
        let result = self.client.batch_execute("COMMIT").map_err(StoreError::from);
        // The server ends the transaction block whether COMMIT succeeds or not.
        self.tx = TxState::Idle;
        result
    }

    fn recover(&mut self) -> StoreResult<()> {
        if self.tx == TxState::Idle {
            return Ok(());
        }
        log::warn!("Rolling back {:?} transaction", self.tx);
        self.client.batch_execute("ROLLBACK")?;
        self.tx = TxState::Idle;
        Ok(())
    }

    fn insert_row(&mut self, record: &GenericRecord) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        let result = self
            .client
            .execute(INSERT_RECORD_SQL, &[&record.num, &record.txt])
            .map(|_| ())
            .map_err(StoreError::from);
        self.tx.observe(result)
    }

    fn insert_rows(&mut self, records: &[GenericRecord]) -> StoreResult<()> {
        self.tx.ensure_usable()?;
        for chunk in records.chunks(Backend::Postgres.max_rows_per_statement()) {
            let sql = multi_row_insert_sql(chunk.len(), Placeholder::Numbered);
            let values: Vec<&(dyn ToSql + Sync)> = chunk
                .iter()
                .flat_map(|r| [&r.num as &(dyn ToSql + Sync), &r.txt as &(dyn ToSql + Sync)])
                .collect();
            let result = self
                .client
                .execute(sql.as_str(), &values)
                .map(|_| ())
                .map_err(StoreError::from);
            self.tx.observe(result)?;
        }
        Ok(())
    }

    fn bulk_load(&mut self, records: &[GenericRecord]) -> StoreResult<u64> {
        self.tx.ensure_idle()?;
        let sink = self.client.copy_in(COPY_RECORDS_SQL)?;
        let mut writer = BinaryCopyInWriter::new(sink, &[Type::INT8, Type::VARCHAR]);
        for record in records {
            writer.write(&[&record.num, &record.txt])?;
        }
        Ok(writer.finish()?)
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        self.client.close().map_err(StoreError::from)
    }
}
