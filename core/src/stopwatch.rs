//! Wall-clock timing of single operations.
//!
//! Every measurement is one sample: no warm-up, no repetition, no
//! aggregation.

use std::time::{Duration, Instant};

/// The value returned by a timed operation together with how long it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    pub fn secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Run `op` between two monotonic timestamps.
pub fn time_operation<T>(op: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = op();
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}

/// Like [`time_operation`] but unwraps a fallible result, so an error
/// propagates with `?` and no timing is reported for it.
pub fn try_time_operation<T, E>(op: impl FnOnce() -> Result<T, E>) -> Result<Timed<T>, E> {
    let timed = time_operation(op);
    Ok(Timed {
        value: timed.value?,
        elapsed: timed.elapsed,
    })
}
