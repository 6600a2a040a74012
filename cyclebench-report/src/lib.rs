#![warn(missing_docs)]
//! cyclebench Report - Run and Profile Output
//!
//! Generates the output formats:
//! - Human-readable text (live progress lines and summaries)
//! - JSON (machine-readable)

mod json;
mod report;
mod terminal;

pub use json::{generate_json_report, parse_json_report};
pub use report::{Report, ReportMeta, ReportSummary, RunReport, RunStatus, SCHEMA_VERSION};
pub use terminal::{
    TerminalObserver, format_human_output, format_measurement, format_not_measuring,
    format_profile, format_progress, format_record, format_repetition_header, format_results,
};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON with the full report
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
