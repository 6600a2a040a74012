//! Test Context
//!
//! The handle a benchmark receives on every iteration. Timed spans are
//! bracketed by [`TestContext::begin_time`] / [`TestContext::end_time`]; several
//! spans per iteration accumulate. Cycles and page faults are folded in by
//! subtracting the reading at `begin_time` and adding the reading at `end_time`.

use crate::measure::{PlatformTimer, TimingSource};
use cyclebench_stats::{Metric, MetricVector};

/// Per-iteration measurement state
pub struct TestContext<'a, C: TimingSource = PlatformTimer> {
    benchmark: &'a str,
    clock: &'a C,
    frequency: u64,
    iteration: MetricVector,
    timing: bool,
    error: Option<String>,
}

impl<'a, C: TimingSource> TestContext<'a, C> {
    pub(crate) fn new(benchmark: &'a str, clock: &'a C, frequency: u64) -> Self {
        Self {
            benchmark,
            clock,
            frequency,
            iteration: MetricVector::new(),
            timing: false,
            error: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.iteration = MetricVector::new();
        self.timing = false;
        self.error = None;
    }

    /// Start a timed span
    #[inline(always)]
    pub fn begin_time(&mut self) {
        if self.timing {
            self.error("begin_time called while a timed span is already open");
            return;
        }
        self.timing = true;
        self.iteration
            .sub(Metric::PageFaults, self.clock.page_fault_count());
        self.iteration
            .sub(Metric::ElapsedCycles, self.clock.read_cycle_counter());
    }

    /// End the current timed span
    #[inline(always)]
    pub fn end_time(&mut self) {
        let cycles = self.clock.read_cycle_counter();
        let faults = self.clock.page_fault_count();
        if !self.timing {
            self.error("end_time called without a matching begin_time");
            return;
        }
        self.timing = false;
        self.iteration.add(Metric::ElapsedCycles, cycles);
        self.iteration.add(Metric::PageFaults, faults);
    }

    /// Attribute processed bytes to this iteration
    #[inline]
    pub fn bytes_processed(&mut self, bytes: u64) {
        self.iteration.add(Metric::BytesProcessed, bytes);
    }

    /// Report a measurement error. The current repetition is aborted once the
    /// iteration returns; only the first message is kept.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(benchmark = self.benchmark, %message, "benchmark reported an error");
        self.error.get_or_insert(message);
    }

    /// Whether an error was reported during this iteration
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Name of the running benchmark
    pub fn benchmark(&self) -> &str {
        self.benchmark
    }

    /// Counter ticks per second
    pub fn cycle_frequency(&self) -> u64 {
        self.frequency
    }

    /// The timing source
    pub fn clock(&self) -> &C {
        self.clock
    }

    /// Close the iteration: the measured vector, or the error that aborts the repetition.
    pub(crate) fn finish(&mut self) -> Result<MetricVector, String> {
        if self.timing && self.error.is_none() {
            self.error = Some("begin_time without a matching end_time".to_string());
        }
        match self.error.take() {
            Some(message) => Err(message),
            None => Ok(self.iteration),
        }
    }
}
