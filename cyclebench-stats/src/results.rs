//! Repetition Results
//!
//! Running total, minimum and maximum of the metric vector over one search run,
//! plus a Welford accumulator for the elapsed-cycle distribution.

use crate::metrics::{Metric, MetricVector};
use serde::{Deserialize, Serialize};

/// Welford's online mean/variance.
///
/// Numerically stable for long runs where a naive sum of squares would lose
/// precision against the mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of the observations (0 when empty)
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator), 0 below two observations
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Outcome of folding one iteration into [`TestResults`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// The iteration is the new maximum
    pub new_max: bool,
    /// The iteration is strictly below the previous minimum
    pub new_min: bool,
}

/// Results of one search run, keyed by elapsed cycles for min/max comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    /// Sum of every recorded iteration
    pub total: MetricVector,
    /// Iteration with the fewest elapsed cycles
    pub min: MetricVector,
    /// Iteration with the most elapsed cycles
    pub max: MetricVector,
    /// Distribution of elapsed cycles per iteration
    pub elapsed: RunningStats,
}

impl TestResults {
    /// Fresh results: zero total and max, `u64::MAX` minimum
    pub fn new() -> Self {
        Self {
            total: MetricVector::new(),
            min: MetricVector::MAX,
            max: MetricVector::new(),
            elapsed: RunningStats::new(),
        }
    }

    /// Fold one iteration in.
    ///
    /// The iteration counts as exactly one, whatever its `iterations` slot held.
    /// The maximum is replaced when the iteration is greater, the minimum only
    /// when it is strictly less.
    pub fn record(&mut self, iteration: MetricVector) -> RecordOutcome {
        let iteration = MetricVector {
            iterations: 1,
            ..iteration
        };

        self.total.accumulate(&iteration);
        self.elapsed.push(iteration.elapsed_cycles as f64);

        let elapsed = iteration.get(Metric::ElapsedCycles);

        let new_max = self.max.elapsed_cycles < elapsed;
        if new_max {
            self.max = iteration;
        }

        let new_min = self.min.elapsed_cycles > elapsed;
        if new_min {
            self.min = iteration;
        }

        RecordOutcome { new_max, new_min }
    }

    /// Number of iterations recorded
    pub fn iterations(&self) -> u64 {
        self.total.iterations
    }

    /// Whether no iteration has been recorded
    pub fn is_empty(&self) -> bool {
        self.total.iterations == 0
    }
}

impl Default for TestResults {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn it(cycles: u64) -> MetricVector {
        MetricVector {
            elapsed_cycles: cycles,
            bytes_processed: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_min_avg_max_ordering() {
        let mut results = TestResults::new();
        for c in [500, 300, 900, 300, 700] {
            results.record(it(c));
        }

        let avg = results.total.per_iteration().elapsed_cycles;
        assert_eq!(results.min.elapsed_cycles, 300);
        assert_eq!(results.max.elapsed_cycles, 900);
        assert!(results.min.elapsed_cycles as f64 <= avg);
        assert!(avg <= results.max.elapsed_cycles as f64);
        assert_eq!(results.iterations(), 5);
    }

    #[test]
    fn test_equal_value_is_not_a_new_minimum() {
        let mut results = TestResults::new();
        assert!(results.record(it(300)).new_min);
        assert!(!results.record(it(300)).new_min);
        assert!(results.record(it(299)).new_min);
    }

    #[test]
    fn test_iteration_slot_is_forced_to_one() {
        let mut results = TestResults::new();
        results.record(MetricVector {
            iterations: 40,
            elapsed_cycles: 10,
            ..Default::default()
        });
        assert_eq!(results.total.iterations, 1);
        assert_eq!(results.min.iterations, 1);
    }

    #[test]
    fn test_empty() {
        let results = TestResults::new();
        assert!(results.is_empty());
        assert_eq!(results.min.elapsed_cycles, u64::MAX);
    }

    #[test]
    fn test_running_stats_matches_two_pass() {
        let values = [1e9 + 4.0, 1e9 + 7.0, 1e9 + 13.0, 1e9 + 16.0];
        let mut stats = RunningStats::new();
        for v in values {
            stats.push(v);
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;

        assert!((stats.mean() - mean).abs() < 1e-6);
        assert!((stats.variance() - var).abs() < 1e-6);
        assert!((stats.variance() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_running_stats_small_counts() {
        let mut stats = RunningStats::new();
        assert_eq!(stats.variance(), 0.0);
        stats.push(5.0);
        assert_eq!(stats.variance(), 0.0);
        assert_eq!(stats.count(), 1);
    }
}
