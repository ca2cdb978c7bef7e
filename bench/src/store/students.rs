//! The indexing lab's `students` table in a single-file SQLite store.

use super::sqlite::configure_connection;
use super::{StoreError, StoreResult};
use lab_core::constants::STUDENT_NAME_PREFIX;
use lab_core::records::{students, StudentRecord};
use rusqlite::{params, Connection};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Rows inserted between two progress log lines while populating.
const POPULATE_LOG_INTERVAL: u64 = 1_000_000;

/// A column of `students` that can carry a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentColumn {
    Name,
    Age,
}

impl StudentColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentColumn::Name => "name",
            StudentColumn::Age => "age",
        }
    }

    /// Name of the index `create_index` builds on this column.
    pub fn index_name(self) -> String {
        format!("{}_index", self.as_str())
    }
}

impl fmt::Display for StudentColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentColumn {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(StudentColumn::Name),
            "age" => Ok(StudentColumn::Age),
            other => Err(StoreError::UnknownColumn(other.to_string())),
        }
    }
}

/// `SELECT * FROM students WHERE age = ? AND name LIKE '<prefix>%'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentQuery {
    pub age: i64,
    pub name_prefix: String,
}

impl StudentQuery {
    pub fn by_age(age: i64) -> Self {
        Self {
            age,
            name_prefix: STUDENT_NAME_PREFIX.to_string(),
        }
    }

    const SQL: &'static str = "SELECT name, age FROM students WHERE age = ?1 AND name LIKE ?2";

    fn like_pattern(&self) -> String {
        format!("{}%", self.name_prefix)
    }
}

/// Full result set of a query plus its cardinality.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<StudentRecord>,
}

impl QueryResult {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

/// Delete the store file (and its WAL side files). Returns whether the main
/// file existed.
pub fn remove_store_file(path: &Path) -> io::Result<bool> {
    let existed = match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        match fs::remove_file(PathBuf::from(side)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(existed)
}

pub struct StudentStore {
    conn: Connection,
}

impl StudentStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// `CREATE TABLE students`; fails if it already exists.
    pub fn create_table(&self) -> StoreResult<()> {
        self.conn
            .execute_batch("CREATE TABLE students (name TEXT, age INTEGER)")?;
        Ok(())
    }

    /// Insert students `0..n` in one transaction with a single commit.
    pub fn populate(&self, n: u64) -> StoreResult<u64> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare_cached("INSERT INTO students (name, age) VALUES (?1, ?2)")?;
            for student in students(0..n) {
                stmt.execute(params![student.name, student.age])?;
                inserted += 1;
                if inserted % POPULATE_LOG_INTERVAL == 0 {
                    log::debug!("Inserted {inserted}/{n} students");
                }
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn query(&self, query: &StudentQuery) -> StoreResult<QueryResult> {
        let mut stmt = self.conn.prepare(StudentQuery::SQL)?;
        let rows = stmt
            .query_map(params![query.age, query.like_pattern()], |r| {
                Ok(StudentRecord {
                    name: r.get(0)?,
                    age: r.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(QueryResult { rows })
    }

    /// `CREATE INDEX <column>_index ON students (<column>)`. No existence
    /// check: a second call fails with the store's "already exists" error.
    pub fn create_index(&self, column: StudentColumn) -> StoreResult<()> {
        let sql = format!(
            "CREATE INDEX {} ON students ({})",
            column.index_name(),
            column.as_str()
        );
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    /// `EXPLAIN QUERY PLAN` detail lines for `query`.
    pub fn explain(&self, query: &StudentQuery) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("EXPLAIN QUERY PLAN {}", StudentQuery::SQL))?;
        let details = stmt
            .query_map(params![query.age, query.like_pattern()], |r| {
                r.get::<_, String>(3)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(details)
    }

    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }
}
