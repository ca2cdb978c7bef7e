//! Synthetic record shapes used by the two labs.
//!
//! - [`StudentRecord`]: deterministic, derived from its position `i`
//!   (`name = "Student<i>"`, `age = i % 60`).
//! - [`GenericRecord`]: random `num` in `[1, 10^17]` and a fixed-length
//!   random `txt`, produced by a [`RecordGenerator`].

use crate::constants::{AGE_MODULUS, MAX_NUM, MIN_NUM, STUDENT_NAME_PREFIX, TEXT_CHARSET};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

/// One row of the `students` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub name: String,
    pub age: i64,
}

impl StudentRecord {
    /// The `i`-th student of a population.
    pub fn nth(i: u64) -> Self {
        Self {
            name: format!("{STUDENT_NAME_PREFIX}{i}"),
            age: (i % AGE_MODULUS) as i64,
        }
    }
}

/// Lazily yields students `range.start .. range.end`.
pub fn students(range: Range<u64>) -> impl Iterator<Item = StudentRecord> {
    range.map(StudentRecord::nth)
}

/// Number of `i` in `[0, total)` with `i % 60 == age`.
pub fn expected_age_matches(total: u64, age: i64) -> u64 {
    if age < 0 || age as u64 >= AGE_MODULUS {
        return 0;
    }
    let age = age as u64;
    total / AGE_MODULUS + u64::from(age < total % AGE_MODULUS)
}

/// One row of the `records` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericRecord {
    pub num: i64,
    pub txt: String,
}

/// Produces [`GenericRecord`]s with a fixed `txt` length.
pub struct RecordGenerator {
    rng: StdRng,
    text_len: usize,
}

impl RecordGenerator {
    /// Generator seeded from OS entropy; every run sees different data.
    pub fn from_entropy(text_len: usize) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            text_len,
        }
    }

    /// Deterministic generator for reproducible runs and tests.
    pub fn seeded(seed: u64, text_len: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            text_len,
        }
    }

    fn next_record(&mut self) -> GenericRecord {
        let num = self.rng.gen_range(MIN_NUM..=MAX_NUM);
        let txt = (0..self.text_len)
            .map(|_| TEXT_CHARSET[self.rng.gen_range(0..TEXT_CHARSET.len())] as char)
            .collect();
        GenericRecord { num, txt }
    }

    /// Generate exactly `n` records.
    pub fn generate(&mut self, n: usize) -> Vec<GenericRecord> {
        (0..n).map(|_| self.next_record()).collect()
    }
}
