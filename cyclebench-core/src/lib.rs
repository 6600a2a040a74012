#![warn(missing_docs)]
//! cyclebench Core - Measurement Runtime
//!
//! This crate provides everything that touches the cycle counter:
//! - `TimingSource` with the hardware `PlatformTimer` and a deterministic `ManualClock`
//! - Hierarchical profiler: exclusive/inclusive cycles per labeled region, recursion safe
//! - Repetition tester: searches for a stable minimum per benchmark
//! - `profile_block!` / `profile_bandwidth!` region macros (feature `profiling`)

mod benchmark;
mod config;
mod context;
mod measure;
mod profiler;
mod tester;

pub use benchmark::{Benchmark, BenchmarkDef, Params};
pub use config::{ConfigOverrides, TestConfig};
pub use context::TestContext;
/// Whether this platform provides a hardware cycle counter (x86_64 TSC or AArch64 CNTVCT_EL0).
/// When `false`, the counter falls back to nanoseconds at a nominal 1 GHz.
pub use measure::HAS_CYCLE_COUNTER;
pub use measure::{
    CALIBRATION_WINDOW, ManualClock, PlatformTimer, TimingSource, calibrate_frequency,
    cycle_counter_frequency, page_fault_count, pin_to_cpu, read_cycle_counter,
};
pub use profiler::{
    Anchor, AnchorId, AnchorReport, AnchorSummary, MAX_ANCHORS, ProfileReport, Profiler,
    ProfilerError, RegionGuard, ScopeMarker, ThreadRegionGuard, begin_thread_profile,
    end_thread_profile, enter_thread_region, with_thread_profiler,
};
pub use tester::{
    RepetitionOutcome, RepetitionRecord, RepetitionStart, RepetitionTester, RunObserver,
    SilentObserver, TesterError,
};

/// Profile the rest of the enclosing scope on this thread's profiler.
///
/// ```ignore
/// fn parse(input: &str) {
///     profile_block!("parse");
///     // ...
/// }
/// ```
#[macro_export]
macro_rules! profile_block {
    ($label:expr $(,)?) => {
        $crate::profile_bandwidth!($label, 0u64)
    };
}

/// Profile the rest of the enclosing scope and attribute `bytes` to it.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_bandwidth {
    ($label:expr, $bytes:expr $(,)?) => {
        let _cyclebench_region = {
            static ANCHOR: ::std::sync::OnceLock<$crate::AnchorId> = ::std::sync::OnceLock::new();
            let anchor = *ANCHOR.get_or_init(|| $crate::AnchorId::intern($label));
            $crate::enter_thread_region(anchor, $label, ($bytes) as u64)
        };
    };
}

/// Profile the rest of the enclosing scope and attribute `bytes` to it.
///
/// Profiling is compiled out: the arguments are type-checked but never evaluated.
#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_bandwidth {
    ($label:expr, $bytes:expr $(,)?) => {
        let _ = || ($label, $bytes);
    };
}
