//! cyclebench Demos
//!
//! Runnable demonstrations of cyclebench features. This crate is not
//! published; it hosts examples that depend on `cyclebench`.
//!
//! Run any example with:
//! ```sh
//! cargo run --example <name> -p cyclebench-demos --release
//! ```
//!
//! | Example | Feature |
//! |---------|---------|
//! | `profile_regions` | `#[profile]`, `profile_block!`, `profile_bandwidth!`, recursion |
//! | `repetition_params` | Parameter generation, caching, printing, forwarded args |
//! | `manual_profiler` | An explicit `Profiler` instead of the thread-local one |
//!
//! The shared workloads below generate inputs and do the measured work.

use cyclebench::{profile, profile_bandwidth, profile_block};
use rand::prelude::*;

/// Pairs of points on a sphere, seeded for reproducible runs
pub fn random_points(count: usize, seed: u64) -> Vec<[f64; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            [
                rng.gen_range(-180.0..180.0),
                rng.gen_range(-90.0..90.0),
                rng.gen_range(-180.0..180.0),
                rng.gen_range(-90.0..90.0),
            ]
        })
        .collect()
}

/// Great-circle distance in kilometers
pub fn haversine(x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6372.8;

    let d_lat = (y1 - y0).to_radians();
    let d_lon = (x1 - x0).to_radians();
    let lat0 = y0.to_radians();
    let lat1 = y1.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat0.cos() * lat1.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Encode point pairs as a JSON array, the input of [`parse_points`]
#[profile]
pub fn encode_points(points: &[[f64; 4]]) -> String {
    let mut output = String::from("{\"pairs\":[\n");
    for (i, [x0, y0, x1, y1]) in points.iter().enumerate() {
        if i > 0 {
            output.push_str(",\n");
        }
        output.push_str(&format!(
            "{{\"x0\":{x0},\"y0\":{y0},\"x1\":{x1},\"y1\":{y1}}}"
        ));
    }
    output.push_str("\n]}\n");
    output
}

/// Parse the output of [`encode_points`]. Malformed lines are skipped.
pub fn parse_points(input: &str) -> Vec<[f64; 4]> {
    profile_bandwidth!("parse_points", input.len());

    let mut points = Vec::new();
    for line in input.lines().filter(|l| l.starts_with("{\"x0\"")) {
        let mut values = [0.0; 4];
        let mut fields = line
            .trim_end_matches(',')
            .trim_matches(|c| c == '{' || c == '}')
            .split(',')
            .filter_map(|field| field.split_once(':'))
            .map(|(_, value)| value.parse::<f64>());

        let complete = values
            .iter_mut()
            .all(|slot| match fields.next() {
                Some(Ok(value)) => {
                    *slot = value;
                    true
                }
                _ => false,
            });
        if complete {
            points.push(values);
        }
    }
    points
}

/// Average haversine distance over all pairs
pub fn average_distance(points: &[[f64; 4]]) -> f64 {
    profile_bandwidth!("average_distance", std::mem::size_of_val(points));

    if points.is_empty() {
        return 0.0;
    }
    let sum: f64 = points
        .iter()
        .map(|&[x0, y0, x1, y1]| haversine(x0, y0, x1, y1))
        .sum();
    sum / points.len() as f64
}

/// Naive recursive Fibonacci; every level enters the same region
pub fn fibonacci(n: u32) -> u64 {
    profile_block!("fibonacci");
    if n < 2 {
        n as u64
    } else {
        fibonacci(n - 1) + fibonacci(n - 2)
    }
}
