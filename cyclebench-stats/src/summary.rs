//! Derived Measurements
//!
//! Converts raw metric vectors into wall-clock and bandwidth figures:
//! - Milliseconds from cycles and the counter frequency
//! - Bandwidth in GiB/s when bytes were processed
//! - Page-fault density (KiB processed per fault) when faults were observed

use crate::metrics::MetricVector;
use crate::results::TestResults;
use serde::{Deserialize, Serialize};

/// Bytes in a kibibyte
pub const KIB: f64 = 1024.0;
/// Bytes in a mebibyte
pub const MIB: f64 = 1024.0 * 1024.0;
/// Bytes in a gibibyte
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Per-iteration figures derived from a [`MetricVector`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Iterations the figures are averaged over
    pub iterations: u64,
    /// Cycles per iteration
    pub cycles: f64,
    /// Seconds per iteration
    pub seconds: f64,
    /// Milliseconds per iteration
    pub milliseconds: f64,
    /// Bytes processed per iteration
    pub bytes: f64,
    /// GiB/s, present when bytes were processed
    pub bandwidth_gbps: Option<f64>,
    /// Page faults per iteration, present when at least one whole fault was seen
    pub page_faults: Option<f64>,
    /// KiB processed per page fault, present alongside `page_faults`
    pub kib_per_fault: Option<f64>,
}

/// Derive per-iteration figures.
///
/// `frequency` is the cycle counter's ticks per second and must be non-zero;
/// callers validate it once when the run starts.
pub fn compute_measurement(vector: &MetricVector, frequency: u64) -> Measurement {
    let avg = vector.per_iteration();

    let seconds = avg.elapsed_cycles / frequency as f64;
    let milliseconds = 1000.0 * seconds;

    let bandwidth_gbps = if avg.bytes_processed > 0.0 {
        Some(avg.bytes_processed / (GIB * seconds))
    } else {
        None
    };

    // Whole faults only; a fractional average below one is noise from a single fault.
    let (page_faults, kib_per_fault) = if avg.page_faults as u64 > 0 {
        (
            Some(avg.page_faults),
            Some(avg.bytes_processed / (avg.page_faults * KIB)),
        )
    } else {
        (None, None)
    };

    Measurement {
        iterations: avg.iterations,
        cycles: avg.elapsed_cycles,
        seconds,
        milliseconds,
        bytes: avg.bytes_processed,
        bandwidth_gbps,
        page_faults,
        kib_per_fault,
    }
}

/// Min / max / average of one completed search run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionSummary {
    /// Fastest iteration
    pub min: Measurement,
    /// Slowest iteration
    pub max: Measurement,
    /// Mean over every iteration
    pub avg: Measurement,
    /// Standard deviation of iteration time in milliseconds
    pub std_dev_ms: f64,
}

/// Summarize run results, or `None` when nothing was recorded
pub fn summarize(results: &TestResults, frequency: u64) -> Option<RepetitionSummary> {
    if results.is_empty() {
        return None;
    }

    Some(RepetitionSummary {
        min: compute_measurement(&results.min, frequency),
        max: compute_measurement(&results.max, frequency),
        avg: compute_measurement(&results.total, frequency),
        std_dev_ms: 1000.0 * results.elapsed.std_dev() / frequency as f64,
    })
}
