//! Report module: prints timings as they are measured and a summary table.

use std::time::Duration;

/// One timed section of a lab run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub lab: String,
    pub label: String,
    pub rows: u64,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn new(lab: &str, label: &str, rows: u64, elapsed: Duration) -> Self {
        Self {
            lab: lab.to_string(),
            label: label.to_string(),
            rows,
            elapsed,
        }
    }

    pub fn secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.secs();
        if secs <= 0.0 {
            return 0.0;
        }
        self.rows as f64 / secs
    }
}

/// `1234567` → `"1,234,567"`.
pub fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// How many times faster `result` was than `baseline`.
pub fn speedup(baseline: &RunResult, result: &RunResult) -> f64 {
    let secs = result.secs();
    if secs <= 0.0 {
        return 0.0;
    }
    baseline.secs() / secs
}

/// Print the line reported right after an insert section.
pub fn print_insert_timing(result: &RunResult) {
    println!(
        "Done, took {:.3}s for {} records ({})",
        result.secs(),
        with_thousands(result.rows),
        result.label
    );
}

/// Print the lines reported right after a query section.
pub fn print_query_timing(label: &str, result: &RunResult) {
    println!("Time taken {label}: {:.3}s", result.secs());
    println!("Number of results: {}", with_thousands(result.rows));
}

/// Print a summary of every section, grouped by lab. Speed-ups are relative
/// to the first entry of each lab.
pub fn print_report(results: &[RunResult]) {
    println!("\n{}", "=".repeat(80));
    println!("  Relational Access-Strategy Report");
    println!("{}", "=".repeat(80));

    let mut labs: Vec<&str> = Vec::new();
    for r in results {
        if !labs.contains(&r.lab.as_str()) {
            labs.push(&r.lab);
        }
    }

    for lab in labs {
        let rows: Vec<&RunResult> = results.iter().filter(|r| r.lab == lab).collect();
        let Some(baseline) = rows.first() else {
            continue;
        };

        println!("\n  Lab: {lab}");
        println!(
            "  {:30} {:>14} {:>10} {:>14} {:>9}",
            "Section", "Rows", "Secs", "Rows/s", "Speed-up"
        );
        println!("  {}", "-".repeat(81));
        for r in &rows {
            println!(
                "  {:30} {:>14} {:>10.3} {:>14.0} {:>8.2}x",
                r.label,
                with_thousands(r.rows),
                r.secs(),
                r.rows_per_sec(),
                speedup(baseline, r)
            );
        }
    }

    println!("\n{}", "=".repeat(80));
    println!();
}
