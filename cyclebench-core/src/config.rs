//! Per-benchmark search configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How one benchmark is searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Search stops once no new minimum was found for this long
    pub max_time: Duration,
    /// How many independent searches to run
    pub repetition_count: u32,
    /// Notify the observer on every new minimum
    pub print_new_minimums: bool,
    /// Generate parameters once per process instead of once per iteration
    pub cache_params: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_time: Duration::from_secs(10),
            repetition_count: 1,
            print_new_minimums: true,
            cache_params: true,
        }
    }
}

impl TestConfig {
    /// Set the search window
    pub fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    /// Set the number of searches
    pub fn repetitions(mut self, count: u32) -> Self {
        self.repetition_count = count;
        self
    }

    /// Enable or disable new-minimum notifications
    pub fn print_new_minimums(mut self, enabled: bool) -> Self {
        self.print_new_minimums = enabled;
        self
    }

    /// Enable or disable parameter caching
    pub fn cache_params(mut self, enabled: bool) -> Self {
        self.cache_params = enabled;
        self
    }
}

/// Overrides layered on top of every benchmark's own [`TestConfig`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Replaces `max_time`
    pub max_time: Option<Duration>,
    /// Replaces `repetition_count`
    pub repetition_count: Option<u32>,
    /// Replaces `print_new_minimums`
    pub print_new_minimums: Option<bool>,
    /// Replaces `cache_params`
    pub cache_params: Option<bool>,
}

impl ConfigOverrides {
    /// Whether no field is overridden
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a benchmark's config
    pub fn apply(&self, config: TestConfig) -> TestConfig {
        TestConfig {
            max_time: self.max_time.unwrap_or(config.max_time),
            repetition_count: self.repetition_count.unwrap_or(config.repetition_count),
            print_new_minimums: self.print_new_minimums.unwrap_or(config.print_new_minimums),
            cache_params: self.cache_params.unwrap_or(config.cache_params),
        }
    }
}
