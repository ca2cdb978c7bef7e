//! Constants shared by the record generators and both labs.

/// Ages cycle through `0..AGE_MODULUS` (`age = i % 60`).
pub const AGE_MODULUS: u64 = 60;

/// Prefix of every synthetic student name (`Student<N>`).
pub const STUDENT_NAME_PREFIX: &str = "Student";

/// Smallest value of a generic record's `num` column.
pub const MIN_NUM: i64 = 1;

/// Largest value of a generic record's `num` column (10^17, fits in BIGINT).
pub const MAX_NUM: i64 = 100_000_000_000_000_000;

/// Default length of a generic record's `txt` column.
pub const DEFAULT_TEXT_LEN: usize = 64;

/// Alphabet used for `txt`: uppercase ASCII letters followed by digits.
pub const TEXT_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
