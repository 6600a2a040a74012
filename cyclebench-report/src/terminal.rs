//! Terminal Output
//!
//! Human-readable text for repetition runs and profiles:
//! - Repetition header with the effective configuration and parameters
//! - `Min:` progress line, rewritten in place while the search runs
//! - `Min` / `Max` / `Avg` summary per converged repetition
//! - Profiler report with one line per anchor

use crate::report::{Report, RunStatus};
use cyclebench_core::{
    ProfileReport, RepetitionOutcome, RepetitionRecord, RepetitionStart, RunObserver, TestConfig,
};
use cyclebench_stats::{Measurement, MetricVector, TestResults, compute_measurement};
use std::io::{self, Write};
use std::time::Duration;

/// Padding that blanks a shorter line before the carriage return
const LINE_CLEAR: &str = "                                   \r";

/// `<label>: <ms>ms[ <GB/s>GB/s][ PF: <n> (<K>K/fault)]`
pub fn format_progress(label: &str, value: &MetricVector, frequency: u64) -> String {
    format_measurement(label, &compute_measurement(value, frequency))
}

/// Same line from already derived figures
pub fn format_measurement(label: &str, m: &Measurement) -> String {
    let mut output = format!("{}: {:.4}ms", label, m.milliseconds);
    if let Some(bandwidth) = m.bandwidth_gbps {
        output.push_str(&format!(" {:.2}GB/s", bandwidth));
    }
    if let (Some(faults), Some(density)) = (m.page_faults, m.kib_per_fault) {
        output.push_str(&format!(" PF: {:.0} ({:.2}K/fault)", faults, density));
    }
    output
}

fn format_max_time(max_time: Duration) -> String {
    if max_time.subsec_nanos() == 0 {
        format!("{} seconds", max_time.as_secs())
    } else {
        format!("{:.3} seconds", max_time.as_secs_f64())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Header printed before a repetition starts iterating
pub fn format_repetition_header(
    benchmark: &str,
    repetition: u32,
    config: &TestConfig,
    params: Option<&str>,
) -> String {
    let mut output = String::new();

    output.push_str(&format!("------ {} ------\n", benchmark));
    output.push_str(&format!("Iteration: {}\n", repetition));
    output.push_str("Configuration:\n");
    output.push_str(&format!(
        "  - Max time to run: {}\n",
        format_max_time(config.max_time)
    ));
    output.push_str(&format!(
        "  - Print new minimums: {}\n",
        yes_no(config.print_new_minimums)
    ));
    output.push_str(&format!(
        "  - Cache parameters: {}\n",
        yes_no(config.cache_params)
    ));
    if let Some(params) = params {
        output.push_str("Parameters:\n");
        output.push_str(params);
        if !params.ends_with('\n') {
            output.push('\n');
        }
    }
    output.push('\n');
    output
}

/// Min / Max / Avg lines of one repetition
pub fn format_results(results: &TestResults, frequency: u64) -> String {
    let mut output = String::new();
    for (label, value) in [
        ("Min", &results.min),
        ("Max", &results.max),
        ("Avg", &results.total),
    ] {
        output.push_str(&format_progress(label, value, frequency));
        output.push('\n');
    }
    output
}

/// Warning for a benchmark whose iteration measured zero cycles
pub fn format_not_measuring(benchmark: &str) -> String {
    format!("Seems like test {} is not measuring anything. Skipping\n", benchmark)
}

/// Text that follows a finished repetition
pub fn format_record(record: &RepetitionRecord, frequency: u64) -> String {
    match &record.outcome {
        RepetitionOutcome::Completed { results } => {
            format!("{}\n", format_results(results, frequency))
        }
        RepetitionOutcome::NotMeasuring { .. } => format_not_measuring(&record.benchmark),
        RepetitionOutcome::Aborted { .. } | RepetitionOutcome::ConfigError { .. } => String::new(),
    }
}

/// Profiler report
pub fn format_profile(profile: &ProfileReport) -> String {
    let mut output = String::new();

    output.push_str("Performance report:\n");
    output.push_str(&format!("    CPU frequency: {}hz\n", profile.frequency));
    output.push_str(&format!("    Total time = {:.4}ms\n", profile.total_ms));

    for anchor in &profile.anchors {
        output.push_str(&format!(
            "    {}[{}]: {:.10}ms ({:.2}%",
            anchor.label, anchor.hits, anchor.milliseconds, anchor.percent
        ));
        if let Some(with_children) = anchor.percent_with_children {
            output.push_str(&format!(", {:.2}% w/children", with_children));
        }
        output.push(')');
        if let Some(bandwidth) = anchor.bandwidth_gbps {
            output.push_str(&format!(
                " {:.3}MBs at {:.2}GB/s",
                anchor.megabytes(),
                bandwidth
            ));
        }
        output.push('\n');
    }

    output
}

/// Whole report as text, for `--format human` written to a file
pub fn format_human_output(report: &Report) -> String {
    let mut output = String::new();

    for run in &report.runs {
        if run.status == RunStatus::ConfigError {
            output.push_str(&format!(
                "[{}]: {}\n\n",
                run.benchmark,
                run.message.as_deref().unwrap_or_default()
            ));
            continue;
        }

        output.push_str(&format_repetition_header(
            &run.benchmark,
            run.repetition,
            &run.config,
            run.params.as_deref(),
        ));

        match (run.status, &run.summary) {
            (RunStatus::Completed, Some(summary)) => {
                for (label, m) in [
                    ("Min", &summary.min),
                    ("Max", &summary.max),
                    ("Avg", &summary.avg),
                ] {
                    output.push_str(&format_measurement(label, m));
                    output.push('\n');
                }
                output.push_str(&format!(
                    "Iterations: {}  Std dev: {:.4}ms\n",
                    run.iterations, summary.std_dev_ms
                ));
            }
            (RunStatus::NotMeasuring, _) => output.push_str(&format_not_measuring(&run.benchmark)),
            (RunStatus::Aborted, _) => output.push_str(&format!(
                "[{}]: {}\n",
                run.benchmark,
                run.message.as_deref().unwrap_or_default()
            )),
            _ => {}
        }
        output.push('\n');
    }

    output.push_str(&format!(
        "{} repetitions: {} completed, {} not measuring, {} aborted, {} configuration errors\n",
        report.summary.total_repetitions,
        report.summary.completed,
        report.summary.not_measuring,
        report.summary.aborted,
        report.summary.config_errors
    ));

    if let Some(profile) = &report.profile {
        output.push('\n');
        output.push_str(&format_profile(profile));
    }

    output
}

/// Live observer printing to a writer (stdout in the CLI).
///
/// Write errors do not interrupt the run; the first one is kept and returned
/// by [`TerminalObserver::finish`].
pub struct TerminalObserver<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> TerminalObserver<W> {
    /// Observer writing to `out`
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    /// Return the writer, or the first write error
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.out),
        }
    }

    fn emit(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            self.error = Some(e);
        }
    }
}

impl<W: Write> RunObserver for TerminalObserver<W> {
    fn repetition_started(&mut self, start: &RepetitionStart<'_>) {
        let header =
            format_repetition_header(start.benchmark, start.repetition, start.config, start.params);
        self.emit(&header);
    }

    fn new_minimum(&mut self, _benchmark: &str, min: &MetricVector, frequency: u64) {
        let line = format_progress("Min", min, frequency);
        self.emit(&line);
        self.emit(LINE_CLEAR);
    }

    fn repetition_finished(&mut self, record: &RepetitionRecord, frequency: u64) {
        let text = format_record(record, frequency);
        self.emit(&text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclebench_core::{AnchorId, AnchorSummary};
    use std::borrow::Cow;

    fn vector(cycles: u64, bytes: u64, faults: u64) -> MetricVector {
        MetricVector {
            iterations: 1,
            page_faults: faults,
            elapsed_cycles: cycles,
            bytes_processed: bytes,
        }
    }

    #[test]
    fn test_progress_line_variants() {
        assert_eq!(
            format_progress("Min", &vector(2_000_000, 0, 0), 1_000_000_000),
            "Min: 2.0000ms"
        );
        assert_eq!(
            format_progress("Max", &vector(1_000_000, 1 << 30, 0), 1_000_000_000),
            "Max: 1.0000ms 1000.00GB/s"
        );
        assert_eq!(
            format_progress("Avg", &vector(1_000, 65_536, 16), 1_000_000),
            "Avg: 1.0000ms 0.06GB/s PF: 16 (4.00K/fault)"
        );
    }

    #[test]
    fn test_header() {
        let config = TestConfig::default().cache_params(false);
        let header = format_repetition_header("read", 2, &config, Some("  size: 64"));
        assert_eq!(
            header,
            "------ read ------\n\
             Iteration: 2\n\
             Configuration:\n  \
             - Max time to run: 10 seconds\n  \
             - Print new minimums: yes\n  \
             - Cache parameters: no\n\
             Parameters:\n  \
             size: 64\n\n"
        );

        let fractional = TestConfig::default().max_time(Duration::from_millis(1500));
        assert!(format_repetition_header("x", 1, &fractional, None).contains("1.500 seconds"));
    }

    #[test]
    fn test_results_lines() {
        let mut results = TestResults::new();
        results.record(vector(1_000, 0, 0));
        results.record(vector(3_000, 0, 0));
        assert_eq!(
            format_results(&results, 1_000_000),
            "Min: 1.0000ms\nMax: 3.0000ms\nAvg: 2.0000ms\n"
        );
    }

    #[test]
    fn test_profile_lines() {
        let profile = ProfileReport {
            frequency: 1_000_000,
            total_cycles: 1_000,
            total_ms: 1.0,
            anchors: vec![
                AnchorSummary {
                    id: AnchorId::new(1).unwrap(),
                    label: Cow::Borrowed("outer"),
                    hits: 1,
                    exclusive_cycles: 250,
                    inclusive_cycles: 750,
                    milliseconds: 0.25,
                    percent: 25.0,
                    percent_with_children: Some(75.0),
                    bytes_processed: 0,
                    bandwidth_gbps: None,
                },
                AnchorSummary {
                    id: AnchorId::new(2).unwrap(),
                    label: Cow::Borrowed("inner"),
                    hits: 3,
                    exclusive_cycles: 500,
                    inclusive_cycles: 500,
                    milliseconds: 0.5,
                    percent: 50.0,
                    percent_with_children: None,
                    bytes_processed: 1 << 20,
                    bandwidth_gbps: Some(1.95),
                },
            ],
        };

        assert_eq!(
            format_profile(&profile),
            "Performance report:\n    \
             CPU frequency: 1000000hz\n    \
             Total time = 1.0000ms\n    \
             outer[1]: 0.2500000000ms (25.00%, 75.00% w/children)\n    \
             inner[3]: 0.5000000000ms (50.00%) 1.000MBs at 1.95GB/s\n"
        );
    }

    #[test]
    fn test_observer_writes_min_line_in_place() {
        let mut observer = TerminalObserver::new(Vec::new());
        observer.new_minimum("x", &vector(1_000, 0, 0), 1_000_000);
        let out = String::from_utf8(observer.finish().unwrap()).unwrap();
        assert!(out.starts_with("Min: 1.0000ms "));
        assert!(out.ends_with('\r'));
    }

    #[test]
    fn test_observer_not_measuring_warning() {
        let mut observer = TerminalObserver::new(Vec::new());
        let record = RepetitionRecord {
            benchmark: "idle".into(),
            repetition: 1,
            config: TestConfig::default(),
            params: None,
            outcome: RepetitionOutcome::NotMeasuring {
                results: TestResults::new(),
            },
        };
        observer.repetition_finished(&record, 1_000);
        let out = String::from_utf8(observer.finish().unwrap()).unwrap();
        assert_eq!(out, "Seems like test idle is not measuring anything. Skipping\n");
    }
}
