//! Benchmark Planner
//!
//! Selects which registered benchmarks run. A regex is matched against each
//! benchmark name; registration order is kept, since repetitions of one
//! benchmark may rely on earlier ones having warmed caches.

use cyclebench_core::{Benchmark, TimingSource};
use regex::Regex;

/// Compile the name filter. The match-all pattern compiles to `None`.
pub fn compile_filter(pattern: &str) -> Result<Option<Regex>, regex::Error> {
    if pattern.is_empty() || pattern == ".*" {
        return Ok(None);
    }
    Regex::new(pattern).map(Some)
}

/// Whether `name` passes the filter
pub fn is_selected(filter: Option<&Regex>, name: &str) -> bool {
    filter.is_none_or(|re| re.is_match(name))
}

/// Keep the benchmarks the filter accepts, in registration order.
pub fn select_benchmarks<C: TimingSource>(
    benchmarks: Vec<Box<dyn Benchmark<C>>>,
    filter: Option<&Regex>,
) -> Vec<Box<dyn Benchmark<C>>> {
    benchmarks
        .into_iter()
        .filter(|b| is_selected(filter, b.name()))
        .collect()
}
