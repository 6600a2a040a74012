//! Report Data Structures

use chrono::{DateTime, Utc};
use cyclebench_core::{ProfileReport, RepetitionOutcome, RepetitionRecord, TestConfig};
use cyclebench_stats::{RepetitionSummary, summarize};
use serde::{Deserialize, Serialize};

/// Version of the JSON layout below
pub const SCHEMA_VERSION: u32 = 1;

/// Complete run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Run metadata
    pub meta: ReportMeta,
    /// One entry per repetition, in run order
    pub runs: Vec<RunReport>,
    /// Counts per outcome
    pub summary: ReportSummary,
    /// Profiler output collected around the run, when any region was hit
    pub profile: Option<ProfileReport>,
}

/// Report metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    /// Layout version
    pub schema_version: u32,
    /// cyclebench version
    pub version: String,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
    /// Counter ticks per second used for every conversion
    pub cycle_frequency: u64,
    /// Arguments forwarded to parameter generators
    pub args: Vec<String>,
}

/// How a repetition ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Converged
    Completed,
    /// Skipped: an iteration measured nothing
    NotMeasuring,
    /// The benchmark reported an error
    Aborted,
    /// Parameters could not be produced for the printer
    ConfigError,
}

/// One repetition of one benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Benchmark name
    pub benchmark: String,
    /// 1-based repetition number
    pub repetition: u32,
    /// Effective configuration
    pub config: TestConfig,
    /// Rendered parameters
    pub params: Option<String>,
    /// Outcome
    pub status: RunStatus,
    /// Error or configuration message
    pub message: Option<String>,
    /// Iterations recorded
    pub iterations: u64,
    /// Min / max / avg figures, when at least one iteration was recorded
    pub summary: Option<RepetitionSummary>,
}

impl RunReport {
    /// Convert a tester record, deriving figures at `frequency`
    pub fn from_record(record: &RepetitionRecord, frequency: u64) -> Self {
        let (status, message) = match &record.outcome {
            RepetitionOutcome::Completed { .. } => (RunStatus::Completed, None),
            RepetitionOutcome::NotMeasuring { .. } => (RunStatus::NotMeasuring, None),
            RepetitionOutcome::Aborted { message, .. } => {
                (RunStatus::Aborted, Some(message.clone()))
            }
            RepetitionOutcome::ConfigError { message } => {
                (RunStatus::ConfigError, Some(message.clone()))
            }
        };

        let results = record.outcome.results();

        Self {
            benchmark: record.benchmark.clone(),
            repetition: record.repetition,
            config: record.config,
            params: record.params.clone(),
            status,
            message,
            iterations: results.map_or(0, |r| r.iterations()),
            summary: results.and_then(|r| summarize(r, frequency)),
        }
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Repetitions run
    pub total_repetitions: usize,
    /// Converged
    pub completed: usize,
    /// Skipped as not measuring
    pub not_measuring: usize,
    /// Aborted by an error
    pub aborted: usize,
    /// Configuration errors
    pub config_errors: usize,
}

impl ReportSummary {
    fn count(runs: &[RunReport]) -> Self {
        let mut summary = Self {
            total_repetitions: runs.len(),
            ..Default::default()
        };
        for run in runs {
            match run.status {
                RunStatus::Completed => summary.completed += 1,
                RunStatus::NotMeasuring => summary.not_measuring += 1,
                RunStatus::Aborted => summary.aborted += 1,
                RunStatus::ConfigError => summary.config_errors += 1,
            }
        }
        summary
    }
}

impl Report {
    /// Build a report from tester records and an optional profile
    pub fn new(
        records: &[RepetitionRecord],
        cycle_frequency: u64,
        args: Vec<String>,
        profile: Option<ProfileReport>,
    ) -> Self {
        let runs: Vec<RunReport> = records
            .iter()
            .map(|r| RunReport::from_record(r, cycle_frequency))
            .collect();

        Self {
            meta: ReportMeta {
                schema_version: SCHEMA_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                cycle_frequency,
                args,
            },
            summary: ReportSummary::count(&runs),
            runs,
            profile: profile.filter(|p| !p.anchors.is_empty()),
        }
    }
}
