//! Metric Vector
//!
//! The fixed set of accumulators recorded for every repetition-tester iteration.
//! All four values move together: an iteration is folded into a total, compared
//! against a minimum, or averaged as one unit.

use serde::{Deserialize, Serialize};

/// One accumulator slot of a [`MetricVector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Number of iterations folded into the vector
    Iterations,
    /// OS-reported page faults
    PageFaults,
    /// Elapsed cycle-counter ticks
    ElapsedCycles,
    /// Bytes the benchmark reported as processed
    BytesProcessed,
}

impl Metric {
    /// Every metric, in storage order
    pub const ALL: [Metric; 4] = [
        Metric::Iterations,
        Metric::PageFaults,
        Metric::ElapsedCycles,
        Metric::BytesProcessed,
    ];
}

/// Accumulators for iteration count, page faults, elapsed cycles and bytes processed.
///
/// Arithmetic wraps: the repetition tester subtracts a start reading and later adds
/// the end reading, so intermediate values may legitimately pass through "negative".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricVector {
    /// Number of iterations folded into this vector
    pub iterations: u64,
    /// Page faults observed
    pub page_faults: u64,
    /// Elapsed cycle-counter ticks
    pub elapsed_cycles: u64,
    /// Bytes processed
    pub bytes_processed: u64,
}

impl MetricVector {
    /// A vector with every slot at `u64::MAX`, the identity for minimum tracking.
    pub const MAX: MetricVector = MetricVector {
        iterations: u64::MAX,
        page_faults: u64::MAX,
        elapsed_cycles: u64::MAX,
        bytes_processed: u64::MAX,
    };

    /// Create an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a single slot
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Iterations => self.iterations,
            Metric::PageFaults => self.page_faults,
            Metric::ElapsedCycles => self.elapsed_cycles,
            Metric::BytesProcessed => self.bytes_processed,
        }
    }

    fn slot_mut(&mut self, metric: Metric) -> &mut u64 {
        match metric {
            Metric::Iterations => &mut self.iterations,
            Metric::PageFaults => &mut self.page_faults,
            Metric::ElapsedCycles => &mut self.elapsed_cycles,
            Metric::BytesProcessed => &mut self.bytes_processed,
        }
    }

    /// Wrapping add into one slot
    #[inline(always)]
    pub fn add(&mut self, metric: Metric, value: u64) {
        let slot = self.slot_mut(metric);
        *slot = slot.wrapping_add(value);
    }

    /// Wrapping subtract from one slot
    #[inline(always)]
    pub fn sub(&mut self, metric: Metric, value: u64) {
        let slot = self.slot_mut(metric);
        *slot = slot.wrapping_sub(value);
    }

    /// Fold another vector into this one, slot by slot
    pub fn accumulate(&mut self, other: &MetricVector) {
        for metric in Metric::ALL {
            self.add(metric, other.get(metric));
        }
    }

    /// Per-iteration averages.
    ///
    /// A vector with zero iterations is averaged over one so single readings pass through.
    pub fn per_iteration(&self) -> MetricAverages {
        let divisor = if self.iterations == 0 {
            1.0
        } else {
            self.iterations as f64
        };

        MetricAverages {
            iterations: self.iterations,
            page_faults: self.page_faults as f64 / divisor,
            elapsed_cycles: self.elapsed_cycles as f64 / divisor,
            bytes_processed: self.bytes_processed as f64 / divisor,
        }
    }
}

/// Floating point per-iteration view of a [`MetricVector`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    /// Iterations the averages were taken over
    pub iterations: u64,
    /// Page faults per iteration
    pub page_faults: f64,
    /// Cycles per iteration
    pub elapsed_cycles: f64,
    /// Bytes per iteration
    pub bytes_processed: f64,
}
