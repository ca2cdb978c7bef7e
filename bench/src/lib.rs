//! Relational Access-Strategy Benchmarks
//!
//! Two labs, each a short sequence of timed operations against a real
//! relational store:
//! - **Indexing**: query latency on a SQLite `students` table before and
//!   after a secondary index on `age`
//! - **Batching**: insert throughput of per-row commit, single commit,
//!   batched and bulk-load strategies against PostgreSQL (or SQLite)
//!
//! Run the labs: `cargo run --release -- [indexing|batching|all]`
//! Run benchmarks: `cargo bench`
//! Run tests: `cargo test`

pub mod batching;
pub mod config;
pub mod indexing;
pub mod report;
pub mod store;
pub mod strategy;
