//! Manual Profiler — An explicit profiler instead of the thread-local one
//!
//! `Profiler` can be owned and passed around. Anchor ids are interned from
//! labels once; `region` returns a guard that closes the region on drop.
//!
//! Run with: cargo run --example manual_profiler -p cyclebench-demos --release

use cyclebench::{AnchorId, Profiler, format_profile};
use cyclebench_demos::{haversine, random_points};

fn sum_distances(profiler: &Profiler, points: &[[f64; 4]]) -> f64 {
    let anchor = AnchorId::intern("sum_distances");
    let _region = profiler.region(anchor, "sum_distances", std::mem::size_of_val(points) as u64);

    points
        .iter()
        .map(|&[x0, y0, x1, y1]| haversine(x0, y0, x1, y1))
        .sum()
}

fn main() -> anyhow::Result<()> {
    let profiler = Profiler::new();
    let setup = AnchorId::intern("setup");

    profiler.begin_profile();

    let marker = profiler.begin_region(setup, "setup", 0);
    let points = random_points(200_000, 42);
    profiler.end_region(marker);

    let total = sum_distances(&profiler, &points);
    let report = profiler.end_profile()?;

    println!("Sum of distances: {:.3}km\n", total);
    print!("{}", format_profile(&report));

    for anchor in profiler.generate_report(report.total_cycles, report.frequency)? {
        println!("{:>16} {:>14} cycles exclusive", anchor.label, anchor.exclusive_cycles);
    }
    Ok(())
}
