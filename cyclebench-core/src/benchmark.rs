//! Benchmark Registration
//!
//! A benchmark is anything implementing [`Benchmark`]: only `name` and `run`
//! are required, everything else has a default. [`BenchmarkDef`] builds one
//! from closures with typed parameters.

use crate::config::TestConfig;
use crate::context::TestContext;
use crate::measure::{PlatformTimer, TimingSource};
use std::any::Any;

/// Opaque parameter handle produced by a generator
pub type Params = Box<dyn Any>;

/// A benchmark the repetition tester can drive
pub trait Benchmark<C: TimingSource = PlatformTimer> {
    /// Display name, also used for filtering
    fn name(&self) -> &str;

    /// One iteration. Report timed spans, bytes and errors through `ctx`.
    fn run(&mut self, ctx: &mut TestContext<'_, C>, params: Option<&dyn Any>);

    /// Build parameters from the forwarded process arguments
    fn generate_params(&mut self, _args: &[String]) -> Option<Params> {
        None
    }

    /// Search configuration
    fn config(&self) -> TestConfig {
        TestConfig::default()
    }

    /// Whether [`Benchmark::print_params`] renders anything. A benchmark with a
    /// printer but no parameters is a configuration error.
    fn has_params_printer(&self) -> bool {
        false
    }

    /// Render parameters for the repetition header
    fn print_params(&self, _params: &dyn Any) -> Option<String> {
        None
    }
}

type RunFn<P, C> = Box<dyn FnMut(&mut TestContext<'_, C>, Option<&P>)>;
type GenerateFn<P> = Box<dyn FnMut(&[String]) -> Option<P>>;
type PrintFn<P> = Box<dyn Fn(&P) -> String>;

/// Closure-backed benchmark with parameters of type `P`
pub struct BenchmarkDef<P, C: TimingSource = PlatformTimer> {
    name: String,
    run: RunFn<P, C>,
    generate: Option<GenerateFn<P>>,
    printer: Option<PrintFn<P>>,
    config: TestConfig,
}

impl<C: TimingSource> BenchmarkDef<(), C> {
    /// Benchmark without parameters
    pub fn new<F>(name: impl Into<String>, mut run: F) -> Self
    where
        F: FnMut(&mut TestContext<'_, C>) + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |ctx, _| run(ctx)),
            generate: None,
            printer: None,
            config: TestConfig::default(),
        }
    }
}

impl<P: 'static, C: TimingSource> BenchmarkDef<P, C> {
    /// Benchmark whose parameters come from `generate`.
    ///
    /// When no parameters are available the iteration reports an error.
    pub fn with_params<G, F>(name: impl Into<String>, generate: G, mut run: F) -> Self
    where
        G: FnMut(&[String]) -> Option<P> + 'static,
        F: FnMut(&mut TestContext<'_, C>, &P) + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |ctx, params| match params {
                Some(params) => run(ctx, params),
                None => ctx.error("no parameters were generated"),
            }),
            generate: Some(Box::new(generate)),
            printer: None,
            config: TestConfig::default(),
        }
    }

    /// Replace the default configuration
    pub fn config(mut self, config: TestConfig) -> Self {
        self.config = config;
        self
    }

    /// Render parameters in the repetition header
    pub fn print_params<F>(mut self, printer: F) -> Self
    where
        F: Fn(&P) -> String + 'static,
    {
        self.printer = Some(Box::new(printer));
        self
    }
}

impl<P: 'static, C: TimingSource> Benchmark<C> for BenchmarkDef<P, C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut TestContext<'_, C>, params: Option<&dyn Any>) {
        (self.run)(ctx, params.and_then(|p| p.downcast_ref::<P>()));
    }

    fn generate_params(&mut self, args: &[String]) -> Option<Params> {
        let generate = self.generate.as_mut()?;
        generate(args).map(|p| Box::new(p) as Params)
    }

    fn config(&self) -> TestConfig {
        self.config
    }

    fn has_params_printer(&self) -> bool {
        self.printer.is_some()
    }

    fn print_params(&self, params: &dyn Any) -> Option<String> {
        let printer = self.printer.as_ref()?;
        params.downcast_ref::<P>().map(|p| printer(p))
    }
}
