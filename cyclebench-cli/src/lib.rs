#![warn(missing_docs)]
//! cyclebench CLI Library
//!
//! This module provides the command line entry point for benchmark binaries.
//! Use `cyclebench::run()` (or `cyclebench_cli::run()`) in your main function
//! to get filtering, config overrides, live progress and report output for
//! your benchmarks.
//!
//! # Example
//!
//! ```ignore
//! use cyclebench::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     cyclebench::run(vec![Box::new(BenchmarkDef::new("noop", |ctx| {
//!         ctx.begin_time();
//!         ctx.end_time();
//!     }))])
//! }
//! ```
//!
//! Arguments after `--` are forwarded to parameter generators.

mod config;
mod planner;

pub use config::{DurationParseError, overrides_from_cli, parse_duration};
pub use planner::{compile_filter, is_selected, select_benchmarks};

use anyhow::Context;
use clap::Parser;
use cyclebench_core::{
    Benchmark, ConfigOverrides, PlatformTimer, RepetitionTester, SilentObserver, TimingSource,
    begin_thread_profile, end_thread_profile, pin_to_cpu,
};
use cyclebench_report::{
    OutputFormat, Report, TerminalObserver, format_human_output, format_profile,
    generate_json_report,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// cyclebench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "cyclebench")]
#[command(version, about = "cyclebench - repetition tester and cycle-accurate profiler")]
pub struct Cli {
    /// Filter benchmarks by regex pattern
    #[arg(default_value = ".*")]
    pub filter: String,

    /// List benchmarks without running them
    #[arg(long)]
    pub list: bool,

    /// Stop searching once no new minimum was found for this long (e.g. 3s, 500ms)
    #[arg(long, value_parser = parse_duration)]
    pub max_time: Option<Duration>,

    /// Number of searches per benchmark
    #[arg(long, short = 'r')]
    pub repetitions: Option<u32>,

    /// Do not show each new minimum while searching
    #[arg(long)]
    pub no_print_minimums: bool,

    /// Regenerate parameters on every iteration
    #[arg(long)]
    pub no_cache_params: bool,

    /// Output format: human, json
    #[arg(long, default_value = "human")]
    pub format: String,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Pin the benchmark thread to this CPU
    #[arg(long)]
    pub pin_cpu: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: Absorb cargo bench's --bench flag
    #[arg(long, hide = true)]
    pub bench: bool,

    /// Arguments forwarded to parameter generators
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Run the cyclebench CLI over `benchmarks`.
/// This is the main entry point for benchmark binaries.
///
/// # Returns
/// `Ok(())` unless the cycle counter is unusable or output cannot be written.
/// Benchmark failures are reported, never returned.
pub fn run(benchmarks: Vec<Box<dyn Benchmark>>) -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli, benchmarks)
}

/// Run the cyclebench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli, benchmarks: Vec<Box<dyn Benchmark>>) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, benchmarks, &mut out)?;
    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the default filter.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "cyclebench=debug,cyclebench_core=debug,cyclebench_cli=debug"
    } else {
        "cyclebench=info,cyclebench_core=info,cyclebench_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed by the host program.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter, run and report, writing human output to `out`.
///
/// Returns `None` for `--list`, otherwise the report that was emitted.
pub fn execute(
    cli: &Cli,
    benchmarks: Vec<Box<dyn Benchmark>>,
    out: &mut dyn Write,
) -> anyhow::Result<Option<Report>> {
    execute_with_clock(cli, benchmarks, || PlatformTimer, out)
}

/// [`execute`] on a custom timing source.
///
/// `clock` is only called once a run is actually needed; `--list` never
/// touches the timing source.
pub fn execute_with_clock<C: TimingSource>(
    cli: &Cli,
    benchmarks: Vec<Box<dyn Benchmark<C>>>,
    clock: impl FnOnce() -> C,
    out: &mut dyn Write,
) -> anyhow::Result<Option<Report>> {
    let format: OutputFormat = cli.format.parse().map_err(anyhow::Error::msg)?;
    let filter = compile_filter(&cli.filter)
        .with_context(|| format!("invalid benchmark filter: {}", cli.filter))?;

    let overrides = overrides_from_cli(cli);
    let benchmarks = select_benchmarks(benchmarks, filter.as_ref());

    // Listing needs no timing source, so it comes before calibration.
    if cli.list {
        list_benchmarks(&benchmarks, &overrides, out)?;
        return Ok(None);
    }

    if benchmarks.is_empty() {
        tracing::warn!(filter = %cli.filter, "no benchmarks matched");
    }

    let mut tester = RepetitionTester::with_clock(clock(), cli.args.clone())
        .context("cannot measure with this platform's cycle counter")?
        .with_overrides(overrides);
    for benchmark in benchmarks {
        tester.register_boxed(benchmark);
    }

    if let Some(cpu) = cli.pin_cpu {
        if let Err(e) = pin_to_cpu(cpu) {
            tracing::warn!(cpu, error = %e, "failed to pin benchmark thread");
        }
    }

    begin_thread_profile();
    let records = match format {
        OutputFormat::Human => {
            let mut observer = TerminalObserver::new(&mut *out);
            let records = tester.run(&mut observer);
            observer.finish().context("failed to write progress")?;
            records
        }
        OutputFormat::Json => tester.run(&mut SilentObserver),
    };
    let profile = end_thread_profile()?;

    let report = Report::new(&records, tester.frequency(), cli.args.clone(), Some(profile));
    write_report(cli, format, &report, out)?;

    Ok(Some(report))
}

/// Print the plan with the configuration each benchmark will actually run with
fn list_benchmarks<C: TimingSource>(
    benchmarks: &[Box<dyn Benchmark<C>>],
    overrides: &ConfigOverrides,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    writeln!(out, "cyclebench Plan:")?;
    for benchmark in benchmarks {
        let config = overrides.apply(benchmark.config());
        writeln!(
            out,
            "├── {} (max time {:?}, {} repetition(s))",
            benchmark.name(),
            config.max_time,
            config.repetition_count
        )?;
    }
    writeln!(out, "{} benchmarks found.", benchmarks.len())?;
    Ok(())
}

fn write_report(
    cli: &Cli,
    format: OutputFormat,
    report: &Report,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let output = match (format, &cli.output) {
        (OutputFormat::Json, _) => generate_json_report(report)?,
        (OutputFormat::Human, Some(_)) => format_human_output(report),
        // Runs were already printed live; only the profile is left.
        (OutputFormat::Human, None) => report.profile.as_ref().map(format_profile).unwrap_or_default(),
    };

    if let Some(ref path) = cli.output {
        std::fs::write(path, output.as_bytes())
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        writeln!(out, "Report written to: {}", path.display())?;
    } else {
        write!(out, "{}", output)?;
    }

    Ok(())
}
