//! Hardware cycle counter and busy-wait timing.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::ffi;

/// Reads the hardware cycle counter.
pub fn cycles() -> u64 {
    // SAFETY: reading the counter has no memory safety implications.
    unsafe { ffi::read_cycle_counter() }
}

/// Spin length used to calibrate counters that do not report a frequency.
const CALIBRATION_WINDOW: Duration = Duration::from_millis(10);

/// Resolves the counter frequency up front.
///
/// Counters without an architectural frequency (x86 TSC) are calibrated by
/// spinning for 10 ms. Call this before the first precise delay so that
/// delay does not absorb the calibration; `PerformanceTelemetry::initialize`
/// already does.
pub fn init() -> u64 {
    frequency_hz()
}

/// Counter frequency in Hz.
///
/// Taken from the architecture when it reports one, otherwise calibrated
/// once per process against the monotonic wall clock.
pub fn frequency_hz() -> u64 {
    static FREQUENCY: OnceLock<u64> = OnceLock::new();
    *FREQUENCY.get_or_init(|| {
        // SAFETY: see `cycles`.
        let reported = unsafe { ffi::read_cycle_frequency() };
        if reported > 0 {
            reported
        } else {
            calibrate_frequency()
        }
    })
}

fn calibrate_frequency() -> u64 {
    let wall_start = Instant::now();
    let cycle_start = cycles();
    while wall_start.elapsed() < CALIBRATION_WINDOW {
        std::hint::spin_loop();
    }
    let cycle_delta = cycles().saturating_sub(cycle_start);
    let wall_ns = wall_start.elapsed().as_nanos() as u64;

    if wall_ns == 0 || cycle_delta == 0 {
        tracing::warn!("cycle counter did not advance during calibration, assuming 1 GHz");
        return 1_000_000_000;
    }

    let hz = (cycle_delta as u128 * 1_000_000_000 / wall_ns as u128) as u64;
    tracing::debug!(hz, cycle_delta, wall_ns, "calibrated cycle counter frequency");
    hz
}

/// Cycles elapsed while running `f`.
pub fn measure<F: FnOnce()>(f: F) -> u64 {
    let start = cycles();
    f();
    cycles().saturating_sub(start)
}

/// Spins on the cycle counter for `micros` microseconds without yielding.
pub fn busy_wait_us(micros: u64) {
    if micros == 0 {
        return;
    }
    let target = (micros as u128 * frequency_hz() as u128 / 1_000_000) as u64;
    let start = cycles();
    while cycles().saturating_sub(start) < target {
        std::hint::spin_loop();
    }
}

/// Full hardware memory barrier.
pub fn memory_barrier() {
    // SAFETY: a fence instruction has no memory safety implications.
    unsafe { ffi::full_memory_barrier() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_monotonic() {
        let a = cycles();
        let b = cycles();
        assert!(b >= a);
    }

    #[test]
    fn frequency_is_plausible() {
        let hz = frequency_hz();
        // Generic timers run as low as a few MHz; TSCs stay well under 10 GHz.
        assert!(hz >= 1_000_000, "frequency too low: {}", hz);
        assert!(hz <= 10_000_000_000, "frequency too high: {}", hz);
    }

    #[test]
    fn busy_wait_spins_for_at_least_most_of_the_request() {
        let start = Instant::now();
        busy_wait_us(2_000);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_micros(1_500), "elapsed {:?}", elapsed);
    }

    #[test]
    fn short_wait_after_init_stays_short() {
        init();
        let start = Instant::now();
        busy_wait_us(1);
        assert!(start.elapsed() < Duration::from_millis(2), "elapsed {:?}", start.elapsed());
    }

    #[test]
    fn calibration_spins_for_its_window() {
        let start = Instant::now();
        let hz = calibrate_frequency();
        let elapsed = start.elapsed();
        assert!(elapsed >= CALIBRATION_WINDOW);
        assert!(hz >= 1_000_000, "frequency too low: {}", hz);
    }

    #[test]
    fn zero_wait_returns_immediately() {
        let start = Instant::now();
        busy_wait_us(0);
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
