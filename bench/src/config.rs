//! Run configuration resolved from environment variables.
//!
//! Every value has a literal default matching the lab handouts; a `.env`
//! file in the working directory is loaded by the binary before resolving.

use anyhow::{bail, Context, Result};
use lab_core::constants::DEFAULT_TEXT_LEN;
use log::LevelFilter;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_PG_URL: &str = "host=localhost port=5432 dbname=rdb_lab_batch_inserts user=postgres";
const DEFAULT_LOG_FILE: &str = "rdb-bench.log";

#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Store file of the indexing lab (deleted at the start of each run).
    pub sqlite_path: PathBuf,
    /// Store file of the batching lab when run against SQLite.
    pub batch_sqlite_path: PathBuf,
    /// libpq-style connection string of the batching lab's server.
    pub pg_url: String,
    pub student_count: u64,
    pub query_age: i64,
    /// Records inserted by each of the per-row strategies.
    pub row_count: usize,
    pub batch_size: usize,
    pub batch_count: usize,
    pub bulk_count: usize,
    pub text_len: usize,
    pub seed: Option<u64>,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("test_database.db"),
            batch_sqlite_path: PathBuf::from("batch_inserts.db"),
            pg_url: DEFAULT_PG_URL.to_string(),
            student_count: 20_000_000,
            query_age: 20,
            row_count: 10_000,
            batch_size: 1_000,
            batch_count: 1_000,
            bulk_count: 1_000_000,
            text_len: DEFAULT_TEXT_LEN,
            seed: None,
            log_level: LevelFilter::Info,
            log_file: Some(DEFAULT_LOG_FILE.to_string()),
        }
    }
}

impl BenchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve every setting through `lookup`, falling back to the default
    /// for variables that are unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            sqlite_path: lookup("RDB_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sqlite_path),
            batch_sqlite_path: lookup("RDB_BATCH_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.batch_sqlite_path),
            pg_url: lookup("RDB_PG_URL").unwrap_or(defaults.pg_url),
            student_count: parse_var(&lookup, "RDB_STUDENT_COUNT")?
                .unwrap_or(defaults.student_count),
            query_age: parse_var(&lookup, "RDB_QUERY_AGE")?.unwrap_or(defaults.query_age),
            row_count: parse_var(&lookup, "RDB_ROW_COUNT")?.unwrap_or(defaults.row_count),
            batch_size: parse_var(&lookup, "RDB_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            batch_count: parse_var(&lookup, "RDB_BATCH_COUNT")?.unwrap_or(defaults.batch_count),
            bulk_count: parse_var(&lookup, "RDB_BULK_COUNT")?.unwrap_or(defaults.bulk_count),
            text_len: parse_var(&lookup, "RDB_TEXT_LEN")?.unwrap_or(defaults.text_len),
            seed: parse_var(&lookup, "RDB_SEED")?,
            log_level: lookup("RDB_LOG_LEVEL")
                .as_deref()
                .and_then(parse_log_level)
                .unwrap_or(defaults.log_level),
            log_file: resolve_log_file(lookup("RDB_LOG_FILE")),
        };

        if config.batch_size == 0 {
            bail!("RDB_BATCH_SIZE must be at least 1");
        }
        if config.batch_size.checked_mul(config.batch_count).is_none() {
            bail!(
                "RDB_BATCH_SIZE ({}) x RDB_BATCH_COUNT ({}) overflows the record count",
                config.batch_size,
                config.batch_count
            );
        }
        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => {
            let cleaned: String = raw.trim().chars().filter(|c| *c != '_').collect();
            let value = cleaned
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: `{raw}`"))?;
            Ok(Some(value))
        }
    }
}

pub fn parse_log_level(value: &str) -> Option<LevelFilter> {
    match value.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn resolve_log_file(value: Option<String>) -> Option<String> {
    match value {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => Some(DEFAULT_LOG_FILE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<BenchConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BenchConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_lab_handouts() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.student_count, 20_000_000);
        assert_eq!(config.batch_size * config.batch_count, 1_000_000);
        assert_eq!(config.text_len, 64);
        assert_eq!(config.log_file.as_deref(), Some("rdb-bench.log"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("RDB_STUDENT_COUNT", "1_000"),
            ("RDB_BATCH_SIZE", " 50 "),
            ("RDB_SEED", "9"),
            ("RDB_LOG_LEVEL", "Debug"),
            ("RDB_LOG_FILE", "none"),
            ("RDB_PG_URL", "host=db user=lab"),
        ])
        .unwrap();
        assert_eq!(config.student_count, 1_000);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.log_file, None);
        assert_eq!(config.pg_url, "host=db user=lab");
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = config_from(&[("RDB_ROW_COUNT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("RDB_ROW_COUNT"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(config_from(&[("RDB_BATCH_SIZE", "0")]).is_err());
    }

    #[test]
    fn overflowing_batch_total_is_rejected() {
        let max = usize::MAX.to_string();
        let err = config_from(&[("RDB_BATCH_SIZE", &max), ("RDB_BATCH_COUNT", "2")]).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    #[test]
    fn unknown_log_level_falls_back() {
        let config = config_from(&[("RDB_LOG_LEVEL", "loud")]).unwrap();
        assert_eq!(config.log_level, LevelFilter::Info);
    }
}
