//! Repetition Tester
//!
//! Drives each registered benchmark through a convergence loop: iterate, fold
//! the iteration into running total/min/max, and stop once no new minimum has
//! been seen for `max_time`. Each benchmark runs `repetition_count` such searches.
//!
//! Per repetition:
//! - Configuring: resolve config and parameters; a parameter printer without
//!   parameters is a configuration error
//! - Converging: iterate until the search window since the last improvement elapses
//! - Reporting: hand the results to the observer
//!
//! Measurement errors and iterations that measured nothing end the current
//! repetition only. Nothing here fails the process except a zero counter
//! frequency, which is rejected up front.

use crate::benchmark::{Benchmark, Params};
use crate::config::{ConfigOverrides, TestConfig};
use crate::context::TestContext;
use crate::measure::{PlatformTimer, TimingSource};
use cyclebench_stats::{MetricVector, TestResults};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::OnceCell;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Repetition tester errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TesterError {
    /// The cycle counter reported a frequency of zero
    #[error("cycle counter frequency is zero; no timing can be derived")]
    ZeroFrequency,
}

/// How a repetition ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepetitionOutcome {
    /// The search converged
    Completed {
        /// Results of the search
        results: TestResults,
    },
    /// An iteration measured zero cycles
    NotMeasuring {
        /// Results recorded before the empty iteration
        results: TestResults,
    },
    /// The benchmark reported an error
    Aborted {
        /// First error message of the failing iteration
        message: String,
        /// Results recorded before the failure
        results: TestResults,
    },
    /// The repetition could not be configured
    ConfigError {
        /// What was inconsistent
        message: String,
    },
}

impl RepetitionOutcome {
    /// Results gathered, if the repetition got as far as iterating
    pub fn results(&self) -> Option<&TestResults> {
        match self {
            RepetitionOutcome::Completed { results }
            | RepetitionOutcome::NotMeasuring { results }
            | RepetitionOutcome::Aborted { results, .. } => Some(results),
            RepetitionOutcome::ConfigError { .. } => None,
        }
    }

    /// Whether the search converged
    pub fn is_completed(&self) -> bool {
        matches!(self, RepetitionOutcome::Completed { .. })
    }
}

/// One finished repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionRecord {
    /// Benchmark name
    pub benchmark: String,
    /// 1-based repetition number
    pub repetition: u32,
    /// Effective configuration
    pub config: TestConfig,
    /// Rendered parameters, when the benchmark has a printer
    pub params: Option<String>,
    /// How it ended
    pub outcome: RepetitionOutcome,
}

/// Header data for a repetition about to start converging
#[derive(Debug, Clone, Copy)]
pub struct RepetitionStart<'a> {
    /// Benchmark name
    pub benchmark: &'a str,
    /// 1-based repetition number
    pub repetition: u32,
    /// Effective configuration
    pub config: &'a TestConfig,
    /// Rendered parameters
    pub params: Option<&'a str>,
}

/// Receives progress from [`RepetitionTester::run`]. Every method defaults to a no-op.
pub trait RunObserver {
    /// A repetition passed configuration and is about to iterate
    fn repetition_started(&mut self, _start: &RepetitionStart<'_>) {}

    /// A new minimum was found and the config asks for it to be shown
    fn new_minimum(&mut self, _benchmark: &str, _min: &MetricVector, _frequency: u64) {}

    /// A repetition ended, in whatever way
    fn repetition_finished(&mut self, _record: &RepetitionRecord, _frequency: u64) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl RunObserver for SilentObserver {}

type ParamSlot = OnceCell<Option<Params>>;

/// The repetition tester engine
pub struct RepetitionTester<C: TimingSource = PlatformTimer> {
    clock: C,
    frequency: u64,
    args: Vec<String>,
    benchmarks: Vec<Box<dyn Benchmark<C>>>,
    params_cache: Vec<ParamSlot>,
    overrides: ConfigOverrides,
}

impl RepetitionTester<PlatformTimer> {
    /// Tester on the hardware counter. `args` are handed to parameter generators.
    pub fn new(args: Vec<String>) -> Result<Self, TesterError> {
        Self::with_clock(PlatformTimer, args)
    }
}

impl<C: TimingSource> RepetitionTester<C> {
    /// Tester on a custom timing source
    pub fn with_clock(clock: C, args: Vec<String>) -> Result<Self, TesterError> {
        let frequency = clock.cycle_counter_frequency();
        if frequency == 0 {
            return Err(TesterError::ZeroFrequency);
        }
        debug!(frequency, "repetition tester ready");

        Ok(Self {
            clock,
            frequency,
            args,
            benchmarks: Vec::new(),
            params_cache: Vec::new(),
            overrides: ConfigOverrides::default(),
        })
    }

    /// Add a benchmark
    pub fn register(&mut self, benchmark: impl Benchmark<C> + 'static) -> &mut Self {
        self.register_boxed(Box::new(benchmark))
    }

    /// Add an already boxed benchmark
    pub fn register_boxed(&mut self, benchmark: Box<dyn Benchmark<C>>) -> &mut Self {
        self.benchmarks.push(benchmark);
        self.params_cache.push(OnceCell::new());
        self
    }

    /// Layer overrides over every benchmark's config
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Registered benchmarks, in run order
    pub fn benchmarks(&self) -> &[Box<dyn Benchmark<C>>] {
        &self.benchmarks
    }

    /// Drop benchmarks whose name fails `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let mut slots = std::mem::take(&mut self.params_cache).into_iter();
        let mut kept = Vec::with_capacity(self.benchmarks.len());
        self.benchmarks.retain(|b| {
            let slot = slots.next().unwrap_or_default();
            let retain = keep(b.name());
            if retain {
                kept.push(slot);
            }
            retain
        });
        self.params_cache = kept;
    }

    /// Counter ticks per second
    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    /// The timing source
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run every repetition of every benchmark, in registration order.
    pub fn run<O: RunObserver + ?Sized>(&mut self, observer: &mut O) -> Vec<RepetitionRecord> {
        let session = Session {
            clock: &self.clock,
            frequency: self.frequency,
            args: &self.args,
        };
        let mut records = Vec::new();

        for (benchmark, slot) in self.benchmarks.iter_mut().zip(&self.params_cache) {
            let config = self.overrides.apply(benchmark.config());
            debug!(benchmark = benchmark.name(), ?config, "configuring");

            for repetition in 1..=config.repetition_count {
                let record = session.repetition(&mut **benchmark, slot, config, repetition, observer);
                observer.repetition_finished(&record, self.frequency);
                records.push(record);
            }
        }

        records
    }
}

/// Cycles in `window` at `frequency`, saturating
fn window_cycles(window: Duration, frequency: u64) -> u64 {
    let cycles = (frequency as u128).saturating_mul(window.as_nanos()) / 1_000_000_000;
    u64::try_from(cycles).unwrap_or(u64::MAX)
}

/// Shared state for one `run` call
struct Session<'a, C: TimingSource> {
    clock: &'a C,
    frequency: u64,
    args: &'a [String],
}

impl<C: TimingSource> Session<'_, C> {
    fn repetition<O: RunObserver + ?Sized>(
        &self,
        benchmark: &mut dyn Benchmark<C>,
        slot: &ParamSlot,
        config: TestConfig,
        repetition: u32,
        observer: &mut O,
    ) -> RepetitionRecord {
        let name = benchmark.name().to_string();
        let record = |params, outcome| RepetitionRecord {
            benchmark: name.clone(),
            repetition,
            config,
            params,
            outcome,
        };

        // ─── Configuring ─────────────────────────────────────────────────────

        let mut pending: Option<Option<Params>> = None;
        let configured: Option<&dyn Any> = if config.cache_params {
            slot.get_or_init(|| {
                debug!(benchmark = %name, "generating cached parameters");
                benchmark.generate_params(self.args)
            })
            .as_deref()
        } else {
            pending.insert(benchmark.generate_params(self.args)).as_deref()
        };

        let params = if benchmark.has_params_printer() {
            let Some(configured) = configured else {
                let message =
                    "A printing method for parameters was provided but parameters cannot be generated";
                error!(benchmark = %name, repetition, "{message}");
                return record(None, RepetitionOutcome::ConfigError {
                    message: message.to_string(),
                });
            };
            benchmark.print_params(configured)
        } else {
            None
        };

        observer.repetition_started(&RepetitionStart {
            benchmark: &name,
            repetition,
            config: &config,
            params: params.as_deref(),
        });

        // ─── Converging ──────────────────────────────────────────────────────

        let mut ctx = TestContext::new(&name, self.clock, self.frequency);
        let mut results = TestResults::new();
        let window = window_cycles(config.max_time, self.frequency);
        let mut last_improvement = self.clock.read_cycle_counter();

        let outcome = loop {
            ctx.reset();

            let fresh;
            let iteration_params = if config.cache_params {
                slot.get().and_then(|p| p.as_deref())
            } else {
                fresh = pending
                    .take()
                    .unwrap_or_else(|| benchmark.generate_params(self.args));
                fresh.as_deref()
            };

            let iteration_start = self.clock.read_cycle_counter();
            benchmark.run(&mut ctx, iteration_params);

            let iteration = match ctx.finish() {
                Ok(iteration) => iteration,
                Err(message) => {
                    error!(benchmark = %name, repetition, %message, "aborting repetition");
                    break RepetitionOutcome::Aborted { message, results };
                }
            };

            if iteration.elapsed_cycles == 0 {
                warn!(
                    benchmark = %name,
                    "Seems like test {name} is not measuring anything. Skipping"
                );
                break RepetitionOutcome::NotMeasuring { results };
            }

            if results.record(iteration).new_min {
                last_improvement = iteration_start;
                if config.print_new_minimums {
                    observer.new_minimum(&name, &results.min, self.frequency);
                }
            }

            let now = self.clock.read_cycle_counter();
            if now.wrapping_sub(last_improvement) > window {
                break RepetitionOutcome::Completed { results };
            }
        };

        // ─── Reporting ───────────────────────────────────────────────────────

        if let Some(results) = outcome.results() {
            debug!(
                benchmark = %name,
                repetition,
                iterations = results.iterations(),
                "repetition finished"
            );
        }

        record(params, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkDef;
    use crate::measure::ManualClock;
    use std::cell::Cell;
    use std::rc::Rc;

    fn tester(clock: &ManualClock) -> RepetitionTester<ManualClock> {
        RepetitionTester::with_clock(clock.clone(), vec!["--size".into(), "64".into()]).unwrap()
    }

    fn one_second() -> TestConfig {
        TestConfig::default().max_time(Duration::from_secs(1))
    }

    /// Benchmark that spends `cost(i)` cycles inside begin/end on iteration `i`
    fn stepped(
        name: &str,
        clock: &ManualClock,
        cost: impl Fn(u64) -> u64 + 'static,
    ) -> BenchmarkDef<(), ManualClock> {
        let clock = clock.clone();
        let mut i = 0;
        BenchmarkDef::new(name, move |ctx| {
            ctx.begin_time();
            clock.advance(cost(i));
            ctx.end_time();
            ctx.bytes_processed(1024);
            i += 1;
        })
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<(String, u32, Option<String>)>,
        minimums: Vec<u64>,
        finished: usize,
    }

    impl RunObserver for Recorder {
        fn repetition_started(&mut self, start: &RepetitionStart<'_>) {
            self.started.push((
                start.benchmark.to_string(),
                start.repetition,
                start.params.map(str::to_string),
            ));
        }

        fn new_minimum(&mut self, _benchmark: &str, min: &MetricVector, _frequency: u64) {
            self.minimums.push(min.elapsed_cycles);
        }

        fn repetition_finished(&mut self, _record: &RepetitionRecord, _frequency: u64) {
            self.finished += 1;
        }
    }

    #[test]
    fn test_zero_frequency_is_rejected() {
        let result = RepetitionTester::with_clock(ManualClock::new(0), Vec::new());
        assert_eq!(result.err(), Some(TesterError::ZeroFrequency));
    }

    #[test]
    fn test_constant_cost_converges_after_window() {
        // 1000 Hz, 1 s window, 100 cycles per iteration: the first iteration is
        // the only minimum, so the loop stops once 1000 cycles have passed.
        let clock = ManualClock::new(1_000);
        let mut tester = tester(&clock);
        tester.register(stepped("constant", &clock, |_| 100).config(one_second()));

        let records = tester.run(&mut SilentObserver);
        assert_eq!(records.len(), 1);

        let RepetitionOutcome::Completed { results } = &records[0].outcome else {
            panic!("expected completion, got {:?}", records[0].outcome);
        };
        assert_eq!(results.iterations(), 11);
        assert_eq!(results.min.elapsed_cycles, 100);
        assert_eq!(results.max.elapsed_cycles, 100);
        assert_eq!(results.total.bytes_processed, 11 * 1024);
    }

    #[test]
    fn test_new_minimum_restarts_window() {
        // Costs fall for five iterations, then stay flat.
        let clock = ManualClock::new(1_000);
        let mut tester = tester(&clock);
        tester.register(
            stepped("falling", &clock, |i| if i < 5 { 200 - 20 * i } else { 120 })
                .config(one_second()),
        );

        let mut recorder = Recorder::default();
        let records = tester.run(&mut recorder);
        let results = records[0].outcome.results().unwrap();

        assert_eq!(recorder.minimums, vec![200, 180, 160, 140, 120]);
        assert_eq!(results.min.elapsed_cycles, 120);
        assert_eq!(results.max.elapsed_cycles, 200);

        let avg = results.total.per_iteration().elapsed_cycles;
        assert!(results.min.elapsed_cycles as f64 <= avg);
        assert!(avg <= results.max.elapsed_cycles as f64);

        // The last improvement started at cycle 680; the loop ends once more
        // than 1000 cycles have passed since then.
        assert_eq!(clock.now(), 1_760);
    }

    #[test]
    fn test_print_new_minimums_off_silences_observer() {
        let clock = ManualClock::new(1_000);
        let mut tester = tester(&clock);
        tester.register(
            stepped("quiet", &clock, |_| 100).config(one_second().print_new_minimums(false)),
        );

        let mut recorder = Recorder::default();
        tester.run(&mut recorder);
        assert!(recorder.minimums.is_empty());
        assert_eq!(recorder.started.len(), 1);
        assert_eq!(recorder.finished, 1);
    }

    #[test]
    fn test_not_measuring_skips_repetition() {
        let clock = ManualClock::new(1_000);
        let mut tester = tester(&clock);
        tester.register(BenchmarkDef::new("idle", |ctx| ctx.bytes_processed(8)).config(one_second()));
        tester.register(stepped("busy", &clock, |_| 100).config(one_second()));

        let records = tester.run(&mut SilentObserver);
        assert_eq!(records.len(), 2);
        assert!(matches!(
            &records[0].outcome,
            RepetitionOutcome::NotMeasuring { results } if results.is_empty()
        ));
        assert!(records[1].outcome.is_completed());
    }

    #[test]
    fn test_error_aborts_only_current_repetition() {
        let clock = ManualClock::new(1_000);
        let inner = clock.clone();
        let calls = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&calls);

        let mut tester = tester(&clock);
        tester.register(
            BenchmarkDef::new("flaky", move |ctx| {
                counter.set(counter.get() + 1);
                ctx.begin_time();
                inner.advance(100);
                ctx.end_time();
                if counter.get() == 3 {
                    ctx.error("short read");
                }
            })
            .config(one_second().repetitions(2)),
        );

        let records = tester.run(&mut SilentObserver);
        assert_eq!(records.len(), 2);

        let RepetitionOutcome::Aborted { message, results } = &records[0].outcome else {
            panic!("expected abort, got {:?}", records[0].outcome);
        };
        assert_eq!(message, "short read");
        assert_eq!(results.iterations(), 2);

        assert_eq!(records[1].repetition, 2);
        assert!(records[1].outcome.is_completed());
    }

    #[test]
    fn test_unbalanced_timing_aborts() {
        let clock = ManualClock::new(1_000);
        let inner = clock.clone();
        let mut tester = tester(&clock);
        tester.register(
            BenchmarkDef::new("dangling", move |ctx| {
                ctx.begin_time();
                inner.advance(10);
            })
            .config(one_second()),
        );

        let records = tester.run(&mut SilentObserver);
        assert!(matches!(records[0].outcome, RepetitionOutcome::Aborted { .. }));
    }

    #[test]
    fn test_cached_params_generated_once() {
        let clock = ManualClock::new(1_000);
        let inner = clock.clone();
        let generated = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&generated);

        let mut tester = tester(&clock);
        tester.register(
            BenchmarkDef::with_params(
                "cached",
                move |args: &[String]| {
                    counter.set(counter.get() + 1);
                    args.get(1).and_then(|s| s.parse::<u64>().ok())
                },
                move |ctx, size: &u64| {
                    ctx.begin_time();
                    inner.advance(100);
                    ctx.end_time();
                    ctx.bytes_processed(*size);
                },
            )
            .config(one_second().repetitions(3))
            .print_params(|size| format!("  size: {size}")),
        );

        let mut recorder = Recorder::default();
        let records = tester.run(&mut recorder);

        assert_eq!(generated.get(), 1);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.outcome.is_completed()));
        assert_eq!(records[0].params.as_deref(), Some("  size: 64"));
        assert_eq!(recorder.started[2], ("cached".into(), 3, Some("  size: 64".into())));

        let results = records[0].outcome.results().unwrap();
        assert_eq!(results.total.bytes_processed, 64 * results.iterations());
    }

    #[test]
    fn test_uncached_params_generated_per_iteration() {
        let clock = ManualClock::new(1_000);
        let inner = clock.clone();
        let generated = Rc::new(Cell::new(0u64));
        let counter = Rc::clone(&generated);

        let mut tester = tester(&clock);
        tester.register(
            BenchmarkDef::with_params(
                "fresh",
                move |_: &[String]| {
                    counter.set(counter.get() + 1);
                    Some(counter.get())
                },
                move |ctx, _: &u64| {
                    ctx.begin_time();
                    inner.advance(100);
                    ctx.end_time();
                },
            )
            .config(one_second().cache_params(false)),
        );

        let records = tester.run(&mut SilentObserver);
        let results = records[0].outcome.results().unwrap();
        assert_eq!(generated.get(), results.iterations());
    }

    #[test]
    fn test_printer_without_params_is_config_error() {
        let clock = ManualClock::new(1_000);
        let inner = clock.clone();
        let runs = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&runs);

        let mut tester = tester(&clock);
        tester.register(
            BenchmarkDef::with_params(
                "unprintable",
                |_: &[String]| None::<u64>,
                move |_, _: &u64| counter.set(counter.get() + 1),
            )
            .config(one_second().repetitions(2))
            .print_params(|size| size.to_string()),
        );
        tester.register(stepped("next", &inner, |_| 100).config(one_second()));

        let mut recorder = Recorder::default();
        let records = tester.run(&mut recorder);

        assert_eq!(records.len(), 3);
        assert!(matches!(records[0].outcome, RepetitionOutcome::ConfigError { .. }));
        assert!(matches!(records[1].outcome, RepetitionOutcome::ConfigError { .. }));
        assert!(records[2].outcome.is_completed());
        assert_eq!(runs.get(), 0);
        assert_eq!(recorder.started.len(), 1);
        assert_eq!(recorder.finished, 3);
    }

    #[test]
    fn test_overrides_and_retain() {
        let clock = ManualClock::new(1_000);
        let mut tester = tester(&clock).with_overrides(ConfigOverrides {
            repetition_count: Some(2),
            max_time: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        tester.register(stepped("keep_me", &clock, |_| 100));
        tester.register(stepped("drop_me", &clock, |_| 100));
        tester.retain(|name| name.starts_with("keep"));

        let names: Vec<_> = tester.benchmarks().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["keep_me"]);

        let records = tester.run(&mut SilentObserver);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].config.max_time, Duration::from_millis(500));
        // 500-cycle window at 100 cycles per iteration.
        assert_eq!(records[0].outcome.results().unwrap().iterations(), 6);
    }

    #[test]
    fn test_window_cycles() {
        assert_eq!(window_cycles(Duration::from_secs(10), 3_000_000_000), 30_000_000_000);
        assert_eq!(window_cycles(Duration::from_millis(1), 1_000), 1);
        assert_eq!(window_cycles(Duration::MAX, u64::MAX), u64::MAX);
    }
}
