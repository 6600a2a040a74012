//! Memory Bandwidth Benchmarks
//!
//! Writes and reads a buffer in several patterns and reports the fastest
//! iteration of each, with bandwidth and page faults.
//!
//! Run with:
//!   cargo run --release --example bandwidth                      # 64 MiB buffer
//!   cargo run --release --example bandwidth -- -- 256            # 256 MiB buffer
//!   cargo run --release --example bandwidth -- "^write" --max-time 3s
//!   cargo run --release --example bandwidth -- --format json -o bandwidth.json

use cyclebench::prelude::*;
use cyclebench::{MIB, profile_block};
use std::hint::black_box;

const DEFAULT_MIB: usize = 64;

/// Buffer size in bytes from the first forwarded argument (MiB), or the default
fn buffer_size(args: &[String]) -> Option<usize> {
    let mib = match args.first() {
        Some(arg) => arg.parse::<usize>().ok()?,
        None => DEFAULT_MIB,
    };
    (mib > 0).then(|| mib * MIB as usize)
}

fn print_size(size: &usize) -> String {
    format!("  - Buffer: {} MiB\n", *size / MIB as usize)
}

/// Allocate inside the timed span so fresh pages fault while being touched
fn write_fresh() -> BenchmarkDef<usize> {
    BenchmarkDef::with_params(
        "write_fresh_allocation",
        |args: &[String]| buffer_size(args),
        |ctx, size: &usize| {
            ctx.begin_time();
            let mut buffer = vec![0u8; *size];
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
            black_box(&buffer);
            ctx.end_time();
            ctx.bytes_processed(*size as u64);
        },
    )
    .config(TestConfig::default().cache_params(false))
    .print_params(print_size)
}

fn write_forward() -> BenchmarkDef<usize> {
    let mut buffer = Vec::new();
    BenchmarkDef::with_params(
        "write_forward",
        |args: &[String]| buffer_size(args),
        move |ctx, size: &usize| {
            buffer.resize(*size, 0u8);

            ctx.begin_time();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
            black_box(&buffer);
            ctx.end_time();
            ctx.bytes_processed(*size as u64);
        },
    )
    .print_params(print_size)
}

fn write_backward() -> BenchmarkDef<usize> {
    let mut buffer = Vec::new();
    BenchmarkDef::with_params(
        "write_backward",
        |args: &[String]| buffer_size(args),
        move |ctx, size: &usize| {
            buffer.resize(*size, 0u8);

            ctx.begin_time();
            for (i, byte) in buffer.iter_mut().rev().enumerate() {
                *byte = i as u8;
            }
            black_box(&buffer);
            ctx.end_time();
            ctx.bytes_processed(*size as u64);
        },
    )
    .print_params(print_size)
}

fn read_sum() -> BenchmarkDef<usize> {
    let mut buffer = Vec::new();
    BenchmarkDef::with_params(
        "read_sum",
        |args: &[String]| buffer_size(args),
        move |ctx, size: &usize| {
            if buffer.len() != *size {
                profile_block!("bandwidth::fill");
                buffer = (0..*size).map(|i| i as u8).collect();
            }

            ctx.begin_time();
            let sum = buffer.iter().fold(0u64, |acc, &b| acc.wrapping_add(b as u64));
            ctx.end_time();

            if black_box(sum) == 0 && *size > 256 {
                ctx.error("buffer was not filled");
            }
            ctx.bytes_processed(*size as u64);
        },
    )
    .config(TestConfig::default().repetitions(2))
    .print_params(print_size)
}

fn main() -> anyhow::Result<()> {
    let benchmarks: Vec<Box<dyn Benchmark>> = vec![
        Box::new(write_fresh()),
        Box::new(write_forward()),
        Box::new(write_backward()),
        Box::new(read_sum()),
    ];
    cyclebench::run(benchmarks)
}
