#![warn(missing_docs)]
//! cyclebench Statistics
//!
//! Bookkeeping for the repetition tester:
//! - `MetricVector`: iteration count, page faults, elapsed cycles and bytes, updated as one unit
//! - `TestResults`: running total / minimum / maximum keyed by elapsed cycles
//! - `RunningStats`: Welford mean and variance without storing samples
//! - `Measurement`: milliseconds, bandwidth and page-fault density derived from a vector

mod metrics;
mod results;
mod summary;

pub use metrics::{Metric, MetricAverages, MetricVector};
pub use results::{RecordOutcome, RunningStats, TestResults};
pub use summary::{
    GIB, KIB, MIB, Measurement, RepetitionSummary, compute_measurement, summarize,
};
