#![warn(missing_docs)]
//! # cyclebench
//!
//! Cycle-accurate profiling and minimum-seeking repetition testing for Rust.
//!
//! cyclebench has two halves that share one timing source:
//! - **Profiler**: labeled regions record hit counts and exclusive/inclusive cycles,
//!   correct under recursion, with optional bytes for bandwidth. Two counter reads per region.
//! - **Repetition tester**: runs each benchmark until no new minimum has been seen for a
//!   configured time, then reports min/max/average time, bandwidth and page faults.
//! - **Timing**: the hardware cycle counter (TSC, CNTVCT_EL0), calibrated against the OS clock.
//!
//! ## Profiling
//!
//! ```ignore
//! use cyclebench::profile;
//!
//! #[profile]
//! fn parse(input: &str) -> usize {
//!     cyclebench::profile_bandwidth!("parse::scan", input.len());
//!     input.lines().count()
//! }
//!
//! fn main() {
//!     cyclebench::begin_thread_profile();
//!     parse("a\nb\n");
//!     let report = cyclebench::end_thread_profile().unwrap();
//!     print!("{}", cyclebench::format_profile(&report));
//! }
//! ```
//!
//! Disable the `profiling` feature to compile every region out.
//!
//! ## Repetition Testing
//!
//! ```ignore
//! use cyclebench::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let data = vec![0u8; 1 << 20];
//!     let sum: BenchmarkDef<()> = BenchmarkDef::new("sum", move |ctx| {
//!         ctx.begin_time();
//!         std::hint::black_box(data.iter().map(|&b| b as u64).sum::<u64>());
//!         ctx.end_time();
//!         ctx.bytes_processed(data.len() as u64);
//!     });
//!     cyclebench::run(vec![Box::new(sum)])
//! }
//! ```

// Re-export core types
pub use cyclebench_core::{
    Anchor, AnchorId, AnchorReport, AnchorSummary, Benchmark, BenchmarkDef, CALIBRATION_WINDOW,
    ConfigOverrides, HAS_CYCLE_COUNTER, MAX_ANCHORS, ManualClock, Params, PlatformTimer,
    ProfileReport, Profiler, ProfilerError, RegionGuard, RepetitionOutcome, RepetitionRecord,
    RepetitionStart, RepetitionTester, RunObserver, ScopeMarker, SilentObserver, TestConfig,
    TestContext, TesterError, ThreadRegionGuard, TimingSource, begin_thread_profile,
    calibrate_frequency, cycle_counter_frequency, end_thread_profile, enter_thread_region,
    page_fault_count, pin_to_cpu, read_cycle_counter, with_thread_profiler,
};

// Re-export region macros
pub use cyclebench_core::{profile_bandwidth, profile_block};
pub use cyclebench_macros::profile;

// Re-export stats
pub use cyclebench_stats::{
    GIB, KIB, MIB, Measurement, Metric, MetricAverages, MetricVector, RecordOutcome,
    RepetitionSummary, RunningStats, TestResults, compute_measurement, summarize,
};

// Re-export reporting
pub use cyclebench_report::{
    OutputFormat, Report, ReportMeta, ReportSummary, RunReport, RunStatus, TerminalObserver,
    format_human_output, format_profile, generate_json_report, parse_json_report,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Benchmark, BenchmarkDef, RepetitionTester, TestConfig, TestContext, profile,
        profile_bandwidth, profile_block,
    };
    pub use std::time::Duration;
}

/// Command line harness
pub mod cli {
    pub use cyclebench_cli::{Cli, execute, execute_with_clock, run_with_cli};
}

/// Run the cyclebench CLI harness.
///
/// Call this from your benchmark binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     cyclebench::run(my_benchmarks())
/// }
/// ```
pub use cyclebench_cli::run;
