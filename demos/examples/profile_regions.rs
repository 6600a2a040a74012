//! Profile Regions — Where did the cycles go?
//!
//! Profiles a small haversine pipeline: generate point pairs, encode them as
//! JSON, parse them back and average the distances. Each stage is a region;
//! `fibonacci` shows that recursive regions are counted once per activation
//! without double counting their inclusive time.
//!
//! Run with: cargo run --example profile_regions -p cyclebench-demos --release [pairs]

use cyclebench::{begin_thread_profile, end_thread_profile, format_profile, profile, profile_block};
use cyclebench_demos::{average_distance, encode_points, fibonacci, parse_points, random_points};

#[profile(name = "generate")]
fn generate(count: usize) -> Vec<[f64; 4]> {
    random_points(count, 0x5EED)
}

fn main() -> anyhow::Result<()> {
    let count = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 100_000,
    };

    begin_thread_profile();

    let points = generate(count);
    let json = encode_points(&points);
    let parsed = parse_points(&json);
    let average = average_distance(&parsed);

    let fib = {
        profile_block!("fibonacci_driver");
        fibonacci(20)
    };

    let report = end_thread_profile()?;

    println!("Pairs: {}", parsed.len());
    println!("Input size: {} bytes", json.len());
    println!("Average distance: {:.6}km", average);
    println!("fibonacci(20) = {}\n", fib);
    print!("{}", format_profile(&report));
    Ok(())
}
