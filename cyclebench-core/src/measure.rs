//! Timing Source
//!
//! Reads the hardware cycle counter (RDTSC on x86_64, CNTVCT_EL0 on AArch64),
//! resolves its frequency, and queries OS page-fault counts. Everything that
//! measures time goes through the [`TimingSource`] trait so tests can swap in
//! a [`ManualClock`].

use std::cell::Cell;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Cycle counter, its frequency, and the process page-fault count.
pub trait TimingSource {
    /// Current counter value in ticks. Monotonic.
    fn read_cycle_counter(&self) -> u64;

    /// Counter ticks per second. Zero means the platform source is broken.
    fn cycle_counter_frequency(&self) -> u64;

    /// Cumulative page faults of this process, 0 when the OS query fails.
    fn page_fault_count(&self) -> u64;
}

// ─── Inline cycle counter helpers ────────────────────────────────────────────

/// Read the time-stamp counter.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    // SAFETY: RDTSC is available on every x86_64 CPU and has no side effects.
    unsafe { std::arch::x86_64::_rdtsc() }
}

/// Read the virtual counter timer on AArch64 (comparable to x86 TSC).
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    let cnt: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on all AArch64 implementations.
    unsafe {
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nostack, nomem));
    }
    cnt
}

/// Nanoseconds since the first read on targets without a user-mode counter.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Whether this platform provides a hardware counter.
pub const HAS_CYCLE_COUNTER: bool = cfg!(target_arch = "x86_64") || cfg!(target_arch = "aarch64");

/// Busy-wait length used to calibrate the TSC against the OS clock.
pub const CALIBRATION_WINDOW: Duration = Duration::from_millis(100);

/// Counter ticks per second, resolved once per process.
pub fn cycle_counter_frequency() -> u64 {
    static FREQUENCY: OnceLock<u64> = OnceLock::new();
    *FREQUENCY.get_or_init(resolve_frequency)
}

#[cfg(target_arch = "aarch64")]
fn resolve_frequency() -> u64 {
    let freq: u64;
    // SAFETY: CNTFRQ_EL0 is readable from EL0.
    unsafe {
        std::arch::asm!("mrs {}, cntfrq_el0", out(reg) freq, options(nostack, nomem));
    }
    freq
}

#[cfg(target_arch = "x86_64")]
fn resolve_frequency() -> u64 {
    calibrate_frequency(CALIBRATION_WINDOW)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn resolve_frequency() -> u64 {
    1_000_000_000
}

/// Estimate counter frequency by spinning for `window` against `Instant`.
pub fn calibrate_frequency(window: Duration) -> u64 {
    let start_time = Instant::now();
    let start_cycles = read_cycle_counter();

    while start_time.elapsed() < window {
        std::hint::spin_loop();
    }

    let cycles = read_cycle_counter().wrapping_sub(start_cycles);
    let seconds = start_time.elapsed().as_secs_f64();
    if seconds <= 0.0 {
        return 0;
    }

    (cycles as f64 / seconds) as u64
}

/// Minor plus major page faults of the current process.
#[cfg(unix)]
pub fn page_fault_count() -> u64 {
    // SAFETY: rusage is plain-old-data; an all-zero value is valid.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    // SAFETY: getrusage writes into a struct we own.
    let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if ret != 0 {
        return 0;
    }
    (usage.ru_minflt as u64).wrapping_add(usage.ru_majflt as u64)
}

/// Page faults are not queried on this platform.
#[cfg(not(unix))]
pub fn page_fault_count() -> u64 {
    0
}

// ─── PlatformTimer ───────────────────────────────────────────────────────────

/// The real hardware timing source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformTimer;

impl TimingSource for PlatformTimer {
    #[inline(always)]
    fn read_cycle_counter(&self) -> u64 {
        read_cycle_counter()
    }

    fn cycle_counter_frequency(&self) -> u64 {
        cycle_counter_frequency()
    }

    #[inline(always)]
    fn page_fault_count(&self) -> u64 {
        page_fault_count()
    }
}

// ─── ManualClock ─────────────────────────────────────────────────────────────

/// A timing source driven entirely by its owner.
///
/// Clones share state, so a benchmark closure can hold a clone and advance the
/// same clock the engine reads.
#[derive(Debug, Clone)]
pub struct ManualClock {
    cycles: Rc<Cell<u64>>,
    page_faults: Rc<Cell<u64>>,
    frequency: u64,
}

impl ManualClock {
    /// A clock at tick zero with the given frequency
    pub fn new(frequency: u64) -> Self {
        Self {
            cycles: Rc::new(Cell::new(0)),
            page_faults: Rc::new(Cell::new(0)),
            frequency,
        }
    }

    /// Move the counter forward
    pub fn advance(&self, cycles: u64) {
        self.cycles.set(self.cycles.get() + cycles);
    }

    /// Set the counter to an absolute value
    pub fn set(&self, cycles: u64) {
        self.cycles.set(cycles);
    }

    /// Record additional page faults
    pub fn fault(&self, count: u64) {
        self.page_faults.set(self.page_faults.get() + count);
    }

    /// Current counter value
    pub fn now(&self) -> u64 {
        self.cycles.get()
    }
}

impl TimingSource for ManualClock {
    fn read_cycle_counter(&self) -> u64 {
        self.cycles.get()
    }

    fn cycle_counter_frequency(&self) -> u64 {
        self.frequency
    }

    fn page_fault_count(&self) -> u64 {
        self.page_faults.get()
    }
}

/// Set CPU affinity to pin the current thread to a specific core
///
/// Keeps counter readings on one core's TSC.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu: usize) -> Result<(), std::io::Error> {
    use std::mem::MaybeUninit;

    unsafe {
        let mut set = MaybeUninit::<libc::cpu_set_t>::zeroed();
        let set_ref = set.assume_init_mut();

        libc::CPU_ZERO(set_ref);
        libc::CPU_SET(cpu, set_ref);

        let result = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), set_ref);

        if result == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

/// CPU pinning is not supported on this platform.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu: usize) -> Result<(), std::io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counter_monotonic() {
        let a = read_cycle_counter();
        let b = read_cycle_counter();
        assert!(b >= a, "cycle counter should be monotonic");
    }

    #[test]
    fn test_frequency_nonzero() {
        assert!(cycle_counter_frequency() > 0);
    }

    #[test]
    fn test_counter_advances_with_wall_clock() {
        let timer = PlatformTimer;
        let start = timer.read_cycle_counter();
        std::thread::sleep(Duration::from_millis(10));
        let elapsed = timer.read_cycle_counter() - start;

        let seconds = elapsed as f64 / timer.cycle_counter_frequency() as f64;
        assert!(seconds >= 0.005, "measured {seconds}s for a 10ms sleep");
        assert!(seconds < 1.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_page_faults_grow_when_touching_memory() {
        let before = page_fault_count();
        let mut buffer = vec![0u8; 16 * 1024 * 1024];
        for i in (0..buffer.len()).step_by(4096) {
            buffer[i] = 1;
        }
        std::hint::black_box(&buffer);
        assert!(page_fault_count() >= before);
    }

    #[test]
    fn test_manual_clock_shared_state() {
        let clock = ManualClock::new(1_000);
        let handle = clock.clone();
        handle.advance(250);
        handle.fault(3);

        assert_eq!(clock.read_cycle_counter(), 250);
        assert_eq!(clock.page_fault_count(), 3);
        assert_eq!(clock.cycle_counter_frequency(), 1_000);
    }
}
