//! Run Configuration
//!
//! Command line flags become [`ConfigOverrides`] layered over each
//! benchmark's own `TestConfig`; there are no configuration files.

use crate::Cli;
use cyclebench_core::ConfigOverrides;
use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_duration`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// Nothing to parse
    #[error("empty duration string")]
    Empty,
    /// The numeric part is not a non-negative number
    #[error("invalid duration number: {0}")]
    InvalidNumber(String),
    /// The unit is not one of ns, us, ms, s, m
    #[error("unknown duration unit: {0}")]
    UnknownUnit(String),
}

/// Parse a duration like `3s`, `500ms`, `1.5s`, `2m`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }

    // Find where the number ends and unit begins
    let (num_part, unit_part) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| s.split_at(i))
        .unwrap_or((s, "s"));

    let value: f64 = num_part
        .trim()
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| DurationParseError::InvalidNumber(num_part.to_string()))?;

    let nanos_per_unit: f64 = match unit_part.trim().to_lowercase().as_str() {
        "ns" => 1.0,
        "us" | "µs" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" | "sec" => 1_000_000_000.0,
        "m" | "min" => 60_000_000_000.0,
        other => return Err(DurationParseError::UnknownUnit(other.to_string())),
    };

    Ok(Duration::from_nanos((value * nanos_per_unit) as u64))
}

/// Overrides requested on the command line
pub fn overrides_from_cli(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        max_time: cli.max_time,
        repetition_count: cli.repetitions,
        print_new_minimums: cli.no_print_minimums.then_some(false),
        cache_params: cli.no_cache_params.then_some(false),
    }
}
