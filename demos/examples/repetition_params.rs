//! Repetition Parameters — Inputs built once, or once per iteration
//!
//! Parameters come from a generator that sees the arguments after `--`.
//! Cached parameters are built once and shared by every repetition; uncached
//! ones are rebuilt for each iteration, outside the timed span. A printer
//! shows them in each repetition header.
//!
//! Run with:
//!   cargo run --example repetition_params -p cyclebench-demos --release
//!   cargo run --example repetition_params -p cyclebench-demos --release -- -- 50000

use cyclebench::prelude::*;
use cyclebench_demos::{average_distance, encode_points, parse_points, random_points};
use rand::prelude::*;
use std::hint::black_box;

const DEFAULT_PAIRS: usize = 10_000;

fn pair_count(args: &[String]) -> Option<usize> {
    match args.first() {
        Some(arg) => arg.parse().ok().filter(|&n| n > 0),
        None => Some(DEFAULT_PAIRS),
    }
}

/// Parse a fixed document; generated once and cached
fn parse_cached() -> BenchmarkDef<String> {
    BenchmarkDef::with_params(
        "parse_cached_input",
        |args: &[String]| pair_count(args).map(|n| encode_points(&random_points(n, 1))),
        |ctx, json: &String| {
            ctx.begin_time();
            let points = parse_points(json);
            ctx.end_time();

            if points.is_empty() {
                ctx.error("input contained no pairs");
            }
            ctx.bytes_processed(json.len() as u64);
        },
    )
    .config(TestConfig::default().max_time(Duration::from_secs(3)).repetitions(2))
    .print_params(|json| format!("  - Input: {} bytes\n", json.len()))
}

/// Average fresh random pairs every iteration
fn average_fresh() -> BenchmarkDef<Vec<[f64; 4]>> {
    BenchmarkDef::with_params(
        "average_fresh_input",
        |args: &[String]| pair_count(args).map(|n| random_points(n, thread_rng().r#gen())),
        |ctx, points: &Vec<[f64; 4]>| {
            ctx.begin_time();
            black_box(average_distance(points));
            ctx.end_time();
            ctx.bytes_processed(std::mem::size_of_val(points.as_slice()) as u64);
        },
    )
    .config(TestConfig::default().cache_params(false))
    .print_params(|points| format!("  - Pairs: {}\n", points.len()))
}

/// Report an error from inside the benchmark; only this repetition is aborted
fn failing() -> BenchmarkDef<()> {
    let mut calls = 0u32;
    BenchmarkDef::new("fails_on_third_iteration", move |ctx| {
        calls += 1;
        ctx.begin_time();
        black_box(calls);
        ctx.end_time();
        if calls == 3 {
            ctx.error("simulated read failure");
        }
    })
    .config(TestConfig::default().max_time(Duration::from_millis(200)).repetitions(2))
}

fn main() -> anyhow::Result<()> {
    cyclebench::run(vec![
        Box::new(parse_cached()),
        Box::new(average_fresh()),
        Box::new(failing()),
    ])
}
