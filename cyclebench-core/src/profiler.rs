//! Hierarchical Profiler
//!
//! Attributes elapsed cycles to nested, possibly recursive, labeled regions.
//!
//! Each region has an [`Anchor`] accumulating *exclusive* cycles (time in the
//! region minus time in regions nested inside it) and *inclusive* cycles (time
//! including nested regions). A single "current parent" register replaces an
//! explicit call stack: regions close in strict LIFO order, so the parent saved
//! in a [`ScopeMarker`] is always the right one to restore.
//!
//! ```text
//! begin A ──► parent = A ─┐
//!   begin B ──► parent = B│   B.exclusive += b, A.exclusive -= b
//!   end   B ──► parent = A│
//! end   A ──► parent = 0 ─┘   A.exclusive += a, A.inclusive = snapshot + a
//! ```
//!
//! Recursion works because each activation snapshots the anchor's inclusive
//! total on entry and overwrites it with `snapshot + elapsed` on exit: the
//! outermost activation's write wins and nothing is counted twice.

use crate::measure::{PlatformTimer, TimingSource};
use cyclebench_stats::{GIB, MIB};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::{LazyLock, Mutex};
use thiserror::Error;

/// Size of the anchor table, including the reserved root slot.
pub const MAX_ANCHORS: usize = 4096;

/// Profiler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfilerError {
    /// The cycle counter reported a frequency of zero
    #[error("cycle counter frequency is zero; no timing can be derived")]
    ZeroFrequency,

    /// Every anchor slot is taken
    #[error("anchor table is full ({capacity} slots); cannot register '{label}'")]
    AnchorCapacity {
        /// Label that did not fit
        label: &'static str,
        /// Table capacity
        capacity: usize,
    },
}

// ─── Anchor ids ──────────────────────────────────────────────────────────────

/// Stable handle of one anchor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(u16);

impl AnchorId {
    /// The root slot: the parent of top-level regions, never reported
    pub const ROOT: AnchorId = AnchorId(0);

    /// An explicit id in `1..MAX_ANCHORS`.
    ///
    /// For callers that enumerate their own regions on a dedicated [`Profiler`].
    /// Do not mix with [`AnchorId::intern`] on the same profiler.
    pub fn new(index: usize) -> Option<Self> {
        if (1..MAX_ANCHORS).contains(&index) {
            Some(AnchorId(index as u16))
        } else {
            None
        }
    }

    /// Slot index
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Id for `label` from the process-wide registry, assigning one on first use.
    pub fn try_intern(label: &'static str) -> Result<Self, ProfilerError> {
        REGISTRY
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .intern(label)
    }

    /// Like [`AnchorId::try_intern`].
    ///
    /// # Panics
    ///
    /// When more than `MAX_ANCHORS - 1` distinct labels are registered.
    pub fn intern(label: &'static str) -> Self {
        match Self::try_intern(label) {
            Ok(id) => id,
            Err(e) => panic!("{e}"),
        }
    }
}

static REGISTRY: LazyLock<Mutex<AnchorRegistry>> =
    LazyLock::new(|| Mutex::new(AnchorRegistry::with_capacity(MAX_ANCHORS)));

/// Label to id interning table
struct AnchorRegistry {
    ids: FxHashMap<&'static str, AnchorId>,
    capacity: usize,
}

impl AnchorRegistry {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: FxHashMap::default(),
            capacity,
        }
    }

    fn intern(&mut self, label: &'static str) -> Result<AnchorId, ProfilerError> {
        if let Some(&id) = self.ids.get(label) {
            return Ok(id);
        }

        // Slot 0 is the root.
        let next = self.ids.len() + 1;
        if next >= self.capacity {
            return Err(ProfilerError::AnchorCapacity {
                label,
                capacity: self.capacity,
            });
        }

        let id = AnchorId(next as u16);
        self.ids.insert(label, id);
        Ok(id)
    }
}

// ─── Anchors and markers ─────────────────────────────────────────────────────

/// Accumulated statistics of one region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Anchor {
    /// Cycles in this region minus cycles in nested regions
    pub exclusive_cycles: u64,
    /// Cycles in this region including nested regions
    pub inclusive_cycles: u64,
    /// Completed activations
    pub hits: u64,
    /// Bytes attributed to this region
    pub bytes_processed: u64,
    /// Label of the most recent activation
    pub label: &'static str,
}

/// One open region. Must be passed back to [`Profiler::end_region`] in LIFO order.
#[must_use = "an open region must be closed with Profiler::end_region"]
#[derive(Debug)]
pub struct ScopeMarker {
    anchor: AnchorId,
    parent: AnchorId,
    label: &'static str,
    previous_inclusive: u64,
    bytes: u64,
    start: u64,
}

impl ScopeMarker {
    /// Anchor this region accumulates into
    pub fn anchor(&self) -> AnchorId {
        self.anchor
    }

    /// Region that was open when this one began
    pub fn parent(&self) -> AnchorId {
        self.parent
    }
}

// ─── Profiler ────────────────────────────────────────────────────────────────

/// Anchor table plus current-parent register.
///
/// Uses `Cell`s rather than locks: one profiler serves one thread. For
/// multi-threaded programs give each thread its own instance (see
/// [`enter_thread_region`]).
pub struct Profiler<C: TimingSource = PlatformTimer> {
    anchors: Box<[Cell<Anchor>]>,
    parent: Cell<AnchorId>,
    profile_start: Cell<u64>,
    clock: C,
}

impl Profiler<PlatformTimer> {
    /// Profiler on the hardware counter
    pub fn new() -> Self {
        Self::with_clock(PlatformTimer)
    }
}

impl Default for Profiler<PlatformTimer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TimingSource> Profiler<C> {
    /// Profiler on a custom timing source
    pub fn with_clock(clock: C) -> Self {
        Self {
            anchors: vec![Cell::new(Anchor::default()); MAX_ANCHORS].into_boxed_slice(),
            parent: Cell::new(AnchorId::ROOT),
            profile_start: Cell::new(0),
            clock,
        }
    }

    /// The timing source
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Innermost open region, `AnchorId::ROOT` when none
    pub fn current_parent(&self) -> AnchorId {
        self.parent.get()
    }

    /// Snapshot of one anchor
    pub fn anchor(&self, id: AnchorId) -> Anchor {
        self.anchors[id.index()].get()
    }

    /// Open a region. The counter is read last so bookkeeping stays outside the timed span.
    #[inline]
    pub fn begin_region(&self, anchor: AnchorId, label: &'static str, bytes: u64) -> ScopeMarker {
        let previous_inclusive = self.anchors[anchor.index()].get().inclusive_cycles;
        let parent = self.parent.replace(anchor);

        ScopeMarker {
            anchor,
            parent,
            label,
            previous_inclusive,
            bytes,
            start: self.clock.read_cycle_counter(),
        }
    }

    /// Close a region and fold its elapsed cycles into its anchor and its parent.
    #[inline]
    pub fn end_region(&self, marker: ScopeMarker) {
        let elapsed = self.clock.read_cycle_counter().wrapping_sub(marker.start);
        self.parent.set(marker.parent);

        let parent_cell = &self.anchors[marker.parent.index()];
        let mut parent = parent_cell.get();
        parent.exclusive_cycles = parent.exclusive_cycles.wrapping_sub(elapsed);
        parent_cell.set(parent);

        // Re-read after the parent write: under recursion both are the same slot.
        let cell = &self.anchors[marker.anchor.index()];
        let mut anchor = cell.get();
        anchor.exclusive_cycles = anchor.exclusive_cycles.wrapping_add(elapsed);
        anchor.inclusive_cycles = marker.previous_inclusive.wrapping_add(elapsed);
        anchor.bytes_processed = anchor.bytes_processed.wrapping_add(marker.bytes);
        anchor.hits += 1;
        anchor.label = marker.label;
        cell.set(anchor);
    }

    /// Open a region closed when the returned guard drops.
    pub fn region(&self, anchor: AnchorId, label: &'static str, bytes: u64) -> RegionGuard<'_, C> {
        RegionGuard {
            profiler: self,
            marker: Some(self.begin_region(anchor, label, bytes)),
        }
    }

    /// Mark the start of the whole profiled span
    pub fn begin_profile(&self) {
        self.profile_start.set(self.clock.read_cycle_counter());
    }

    /// Close the profiled span and collect every non-empty anchor
    pub fn end_profile(&self) -> Result<ProfileReport, ProfilerError> {
        let end = self.clock.read_cycle_counter();
        let total_cycles = end.wrapping_sub(self.profile_start.get());
        let frequency = self.clock.cycle_counter_frequency();

        let anchors = self.generate_report(total_cycles, frequency)?.collect();

        Ok(ProfileReport {
            frequency,
            total_cycles,
            total_ms: 1000.0 * total_cycles as f64 / frequency as f64,
            anchors,
        })
    }

    /// Lazy per-anchor summaries in id order, skipping the root and idle anchors.
    ///
    /// The returned iterator is `Clone`; clone it before consuming to walk it again.
    pub fn generate_report(
        &self,
        total_cycles: u64,
        frequency: u64,
    ) -> Result<AnchorReport<'_>, ProfilerError> {
        if frequency == 0 {
            return Err(ProfilerError::ZeroFrequency);
        }

        Ok(AnchorReport {
            anchors: &self.anchors,
            next: 1,
            total_cycles,
            frequency,
        })
    }
}

/// Scope guard for one region
#[must_use = "the region ends as soon as the guard is dropped"]
pub struct RegionGuard<'a, C: TimingSource> {
    profiler: &'a Profiler<C>,
    marker: Option<ScopeMarker>,
}

impl<C: TimingSource> Drop for RegionGuard<'_, C> {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            self.profiler.end_region(marker);
        }
    }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Derived figures for one anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSummary {
    /// Anchor slot
    pub id: AnchorId,
    /// Display label
    pub label: Cow<'static, str>,
    /// Completed activations
    pub hits: u64,
    /// Exclusive cycles
    pub exclusive_cycles: u64,
    /// Inclusive cycles
    pub inclusive_cycles: u64,
    /// Exclusive time in milliseconds
    pub milliseconds: f64,
    /// Exclusive share of the profiled span
    pub percent: f64,
    /// Inclusive share, present only when the region had nested regions
    pub percent_with_children: Option<f64>,
    /// Bytes attributed to the region
    pub bytes_processed: u64,
    /// Throughput over inclusive time, present when bytes were attributed
    pub bandwidth_gbps: Option<f64>,
}

impl AnchorSummary {
    /// Attributed bytes in MiB
    pub fn megabytes(&self) -> f64 {
        self.bytes_processed as f64 / MIB
    }
}

/// Lazy, restartable walk over an anchor table
#[derive(Debug, Clone)]
pub struct AnchorReport<'a> {
    anchors: &'a [Cell<Anchor>],
    next: usize,
    total_cycles: u64,
    frequency: u64,
}

impl AnchorReport<'_> {
    fn summarize(&self, index: usize, anchor: Anchor) -> AnchorSummary {
        let frequency = self.frequency as f64;
        let share = |cycles: u64| {
            if self.total_cycles == 0 {
                0.0
            } else {
                100.0 * cycles as f64 / self.total_cycles as f64
            }
        };

        let percent_with_children = (anchor.inclusive_cycles != anchor.exclusive_cycles)
            .then(|| share(anchor.inclusive_cycles));

        let bandwidth_gbps = (anchor.bytes_processed != 0).then(|| {
            let seconds = anchor.inclusive_cycles as f64 / frequency;
            anchor.bytes_processed as f64 / seconds / GIB
        });

        AnchorSummary {
            id: AnchorId(index as u16),
            label: Cow::Borrowed(anchor.label),
            hits: anchor.hits,
            exclusive_cycles: anchor.exclusive_cycles,
            inclusive_cycles: anchor.inclusive_cycles,
            milliseconds: 1000.0 * anchor.exclusive_cycles as f64 / frequency,
            percent: share(anchor.exclusive_cycles),
            percent_with_children,
            bytes_processed: anchor.bytes_processed,
            bandwidth_gbps,
        }
    }
}

impl Iterator for AnchorReport<'_> {
    type Item = AnchorSummary;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.anchors.len() {
            let index = self.next;
            self.next += 1;

            let anchor = self.anchors[index].get();
            if anchor.exclusive_cycles != 0 {
                return Some(self.summarize(index, anchor));
            }
        }
        None
    }
}

/// Owned result of a profiled span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    /// Counter ticks per second
    pub frequency: u64,
    /// Cycles between `begin_profile` and `end_profile`
    pub total_cycles: u64,
    /// The same span in milliseconds
    pub total_ms: f64,
    /// Non-empty anchors in id order
    pub anchors: Vec<AnchorSummary>,
}

// ─── Thread-local profiler ───────────────────────────────────────────────────

thread_local! {
    static THREAD_PROFILER: Profiler = Profiler::new();
}

/// Run `f` against this thread's profiler
pub fn with_thread_profiler<R>(f: impl FnOnce(&Profiler) -> R) -> R {
    THREAD_PROFILER.with(f)
}

/// Guard for a region on this thread's profiler. Not `Send`.
#[must_use = "the region ends as soon as the guard is dropped"]
pub struct ThreadRegionGuard {
    marker: Option<ScopeMarker>,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for ThreadRegionGuard {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            // During thread teardown the profiler may already be gone.
            let _ = THREAD_PROFILER.try_with(|p| p.end_region(marker));
        }
    }
}

/// Open a region on this thread's profiler
#[inline]
pub fn enter_thread_region(anchor: AnchorId, label: &'static str, bytes: u64) -> ThreadRegionGuard {
    ThreadRegionGuard {
        marker: Some(THREAD_PROFILER.with(|p| p.begin_region(anchor, label, bytes))),
        _thread_bound: PhantomData,
    }
}

/// Start this thread's profiled span
pub fn begin_thread_profile() {
    THREAD_PROFILER.with(|p| p.begin_profile());
}

/// End this thread's profiled span and collect its report
pub fn end_thread_profile() -> Result<ProfileReport, ProfilerError> {
    THREAD_PROFILER.with(|p| p.end_profile())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::ManualClock;

    fn id(n: usize) -> AnchorId {
        AnchorId::new(n).unwrap()
    }

    fn profiler() -> (Profiler<ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (Profiler::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_single_region() {
        let (p, clock) = profiler();
        let m = p.begin_region(id(1), "work", 0);
        clock.advance(100);
        p.end_region(m);

        let a = p.anchor(id(1));
        assert_eq!(a.exclusive_cycles, 100);
        assert_eq!(a.inclusive_cycles, 100);
        assert_eq!(a.hits, 1);
        assert_eq!(a.label, "work");
        assert_eq!(p.current_parent(), AnchorId::ROOT);
    }

    #[test]
    fn test_parent_child_split() {
        let (p, clock) = profiler();
        let outer = p.begin_region(id(1), "outer", 0);
        clock.advance(10);
        let inner = p.begin_region(id(2), "inner", 0);
        assert_eq!(p.current_parent(), id(2));
        clock.advance(30);
        p.end_region(inner);
        assert_eq!(p.current_parent(), id(1));
        clock.advance(5);
        p.end_region(outer);

        let a = p.anchor(id(1));
        let b = p.anchor(id(2));
        assert_eq!(a.inclusive_cycles, 45);
        assert_eq!(a.exclusive_cycles, 15);
        assert_eq!(b.exclusive_cycles, 30);
        assert_eq!(b.inclusive_cycles, 30);
        assert_eq!(a.exclusive_cycles + b.exclusive_cycles, a.inclusive_cycles);
    }

    #[test]
    fn test_siblings_and_repeated_activations() {
        let (p, clock) = profiler();
        let root = p.begin_region(id(1), "root", 0);
        for cost in [7, 11, 13] {
            let child = p.begin_region(id(2), "child", 0);
            clock.advance(cost);
            p.end_region(child);
            let other = p.begin_region(id(3), "other", 0);
            clock.advance(2);
            p.end_region(other);
        }
        clock.advance(1);
        p.end_region(root);

        let root = p.anchor(id(1));
        let child = p.anchor(id(2));
        let other = p.anchor(id(3));
        assert_eq!(child.inclusive_cycles, 31);
        assert_eq!(child.hits, 3);
        assert_eq!(other.inclusive_cycles, 6);
        assert_eq!(root.inclusive_cycles, 38);
        assert_eq!(
            root.exclusive_cycles + child.exclusive_cycles + other.exclusive_cycles,
            root.inclusive_cycles
        );
    }

    #[test]
    fn test_recursion_counts_once() {
        let (p, clock) = profiler();
        let outer = p.begin_region(id(1), "recurse", 0);
        clock.advance(10);
        let inner = p.begin_region(id(1), "recurse", 0);
        clock.advance(20);
        p.end_region(inner);
        clock.advance(5);
        p.end_region(outer);

        let a = p.anchor(id(1));
        assert_eq!(a.inclusive_cycles, 35);
        assert_eq!(a.exclusive_cycles, 35);
        assert_eq!(a.hits, 2);
    }

    #[test]
    fn test_recursion_with_child() {
        let (p, clock) = profiler();
        let outer = p.begin_region(id(1), "walk", 0);
        clock.advance(4);
        let inner = p.begin_region(id(1), "walk", 0);
        clock.advance(6);
        let leaf = p.begin_region(id(2), "leaf", 0);
        clock.advance(20);
        p.end_region(leaf);
        p.end_region(inner);
        p.end_region(outer);

        let walk = p.anchor(id(1));
        let leaf = p.anchor(id(2));
        assert_eq!(walk.inclusive_cycles, 30);
        assert_eq!(walk.exclusive_cycles, 10);
        assert_eq!(leaf.exclusive_cycles, 20);
        assert_eq!(walk.exclusive_cycles + leaf.exclusive_cycles, walk.inclusive_cycles);
    }

    #[test]
    fn test_guard_closes_on_early_return() {
        fn fallible(p: &Profiler<ManualClock>, clock: &ManualClock) -> Result<(), &'static str> {
            let _region = p.region(id(4), "fallible", 0);
            clock.advance(9);
            Err("bail")?;
            clock.advance(1_000);
            Ok(())
        }

        let (p, clock) = profiler();
        assert!(fallible(&p, &clock).is_err());
        assert_eq!(p.current_parent(), AnchorId::ROOT);
        assert_eq!(p.anchor(id(4)).inclusive_cycles, 9);
    }

    #[test]
    fn test_bytes_and_label_last_write_wins() {
        let (p, clock) = profiler();
        for label in ["first", "second"] {
            let m = p.begin_region(id(5), label, 512);
            clock.advance(1);
            p.end_region(m);
        }
        let a = p.anchor(id(5));
        assert_eq!(a.bytes_processed, 1024);
        assert_eq!(a.label, "second");
    }

    #[test]
    fn test_report_figures() {
        let (p, clock) = profiler();
        p.begin_profile();
        let outer = p.begin_region(id(1), "outer", 0);
        clock.advance(250);
        let inner = p.begin_region(id(2), "inner", 1 << 20);
        clock.advance(500);
        p.end_region(inner);
        p.end_region(outer);
        clock.advance(250);

        let report = p.end_profile().unwrap();
        assert_eq!(report.total_cycles, 1_000);
        assert!((report.total_ms - 1.0).abs() < 1e-9);
        assert_eq!(report.anchors.len(), 2);

        let outer = &report.anchors[0];
        assert_eq!(outer.label, "outer");
        assert!((outer.percent - 25.0).abs() < 1e-9);
        assert!((outer.percent_with_children.unwrap() - 75.0).abs() < 1e-9);
        assert!(outer.bandwidth_gbps.is_none());

        let inner = &report.anchors[1];
        assert!(inner.percent_with_children.is_none());
        assert!((inner.milliseconds - 0.5).abs() < 1e-9);
        // 1 MiB over 0.5 ms.
        let expected = (1u64 << 20) as f64 / 0.0005 / GIB;
        assert!((inner.bandwidth_gbps.unwrap() - expected).abs() < 1e-6);
        assert!((inner.megabytes() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_is_restartable_and_skips_idle() {
        let (p, clock) = profiler();
        for n in [3, 9] {
            let m = p.begin_region(id(n), "busy", 0);
            clock.advance(n as u64);
            p.end_region(m);
        }

        let report = p.generate_report(100, 1_000).unwrap();
        let ids: Vec<_> = report.clone().map(|s| s.id).collect();
        assert_eq!(ids, vec![id(3), id(9)]);
        assert_eq!(report.count(), 2);
    }

    #[test]
    fn test_report_rejects_zero_frequency() {
        let (p, _) = profiler();
        assert_eq!(
            p.generate_report(100, 0).unwrap_err(),
            ProfilerError::ZeroFrequency
        );
        let broken = Profiler::with_clock(ManualClock::new(0));
        assert!(broken.end_profile().is_err());
    }

    #[test]
    fn test_explicit_id_bounds() {
        assert!(AnchorId::new(0).is_none());
        assert!(AnchorId::new(MAX_ANCHORS).is_none());
        assert_eq!(AnchorId::new(MAX_ANCHORS - 1).unwrap().index(), MAX_ANCHORS - 1);
    }

    #[test]
    fn test_interning_is_stable() {
        let a = AnchorId::intern("profiler::tests::interned_a");
        let b = AnchorId::intern("profiler::tests::interned_b");
        assert_ne!(a, b);
        assert_ne!(a, AnchorId::ROOT);
        assert_eq!(a, AnchorId::intern("profiler::tests::interned_a"));
    }

    #[test]
    fn test_registry_capacity() {
        let mut registry = AnchorRegistry::with_capacity(3);
        assert_eq!(registry.intern("a").unwrap().index(), 1);
        assert_eq!(registry.intern("b").unwrap().index(), 2);
        assert_eq!(registry.intern("a").unwrap().index(), 1);
        assert_eq!(
            registry.intern("c").unwrap_err(),
            ProfilerError::AnchorCapacity {
                label: "c",
                capacity: 3
            }
        );
    }

    #[test]
    fn test_thread_profiler_is_per_thread() {
        let anchor = AnchorId::intern("profiler::tests::per_thread");

        let handle = std::thread::spawn(move || {
            {
                let _region = enter_thread_region(anchor, "per_thread", 0);
                std::hint::black_box((0..1000u64).sum::<u64>());
            }
            with_thread_profiler(|p| p.anchor(anchor).hits)
        });

        assert_eq!(handle.join().unwrap(), 1);
        assert_eq!(with_thread_profiler(|p| p.anchor(anchor).hits), 0);
    }
}
