//! Randomized delays and computational noise to blur timing side channels.
//!
//! Delays busy-wait on the cycle counter so their length is precise; only
//! `jitter_sleep_ms` hands part of its delay to the OS scheduler. On x86 the
//! first delay in a process spins through counter calibration unless
//! `clock::init()` (or `PerformanceTelemetry::initialize`) ran before it.

use std::ptr;
use std::thread;
use std::time::Duration;

use rand::{Rng, RngCore};

use crate::platform::clock;

const LCG_MULTIPLIER: u64 = 6364136223846793005;
const LCG_INCREMENT: u64 = 1442695040888963407;

/// Busy-waits a uniformly drawn number of microseconds in `[min, max]`.
/// Negative `min` is raised to 0 and `max` is raised to `min`.
pub fn random_delay_us(min: i64, max: i64) -> u64 {
    let min = min.max(0);
    let max = max.max(min);
    let micros = rand::thread_rng().gen_range(min..=max) as u64;
    clock::busy_wait_us(micros);
    micros
}

/// Busy-waits an exponentially distributed delay with the given mean.
pub fn exponential_delay_us(mean: f64) -> u64 {
    if !(mean > 0.0) {
        return 0;
    }
    let micros = sample_exponential(mean, rand::thread_rng().gen::<f64>());
    clock::busy_wait_us(micros);
    micros
}

/// Inverse CDF of Exp(1/mean) at `uniform` in `[0, 1)`, rounded to whole µs.
fn sample_exponential(mean: f64, uniform: f64) -> u64 {
    let draw = -mean * (1.0 - uniform).ln();
    if draw.is_finite() {
        draw.round().max(0.0) as u64
    } else {
        0
    }
}

/// Runs `intensity * 10` rounds of mixed arithmetic on a volatile accumulator.
pub fn add_timing_noise(intensity: u32) {
    let operations = intensity.min(100) as u64 * 10;
    let mut rng = rand::thread_rng();
    let mut acc: u64 = 0;

    for i in 0..operations {
        let value = std::hint::black_box(rng.next_u64());
        // SAFETY: `acc` is a live local; volatile access keeps the loop alive.
        unsafe {
            let current = ptr::read_volatile(&acc);
            let next = match i % 5 {
                0 => current.wrapping_add(value),
                1 => current.wrapping_mul(value),
                2 => current ^ value,
                3 => current.rotate_left(3),
                _ => current
                    .wrapping_mul(LCG_MULTIPLIER)
                    .wrapping_add(LCG_INCREMENT),
            };
            ptr::write_volatile(&mut acc, next);
        }
    }
    std::hint::black_box(acc);
    clock::memory_barrier();
}

/// Wraps `f` in random delay and noise: pre-delay, pre-noise, call,
/// post-delay, post-noise.
pub fn execute_with_obfuscation<F, R>(f: F, chaos_percent: u32) -> R
where
    F: FnOnce() -> R,
{
    let chaos = chaos_percent.min(100);
    random_delay_us(0, chaos as i64 * 10);
    add_timing_noise(chaos / 2);
    let result = f();
    random_delay_us(0, chaos as i64 * 20);
    add_timing_noise(chaos / 2);
    result
}

/// Milliseconds `jitter_sleep_ms` will wait for a given draw in
/// `[-jitter_ms, +jitter_ms]`.
fn jittered_ms(base_ms: u64, draw: i64) -> u64 {
    (base_ms as i64).saturating_add(draw).max(0) as u64
}

/// Sleeps `base_ms` ± `jitter_percent`%.
///
/// Delays over 10 ms sleep for 70% and busy-wait the remaining 30%, so the
/// tail of the delay is precise; shorter delays busy-wait entirely.
pub fn jitter_sleep_ms(base_ms: u64, jitter_percent: u32) -> Duration {
    let base_ms = base_ms.min(i64::MAX as u64 / 2);
    let jitter_ms = (base_ms.saturating_mul(jitter_percent.min(100) as u64) / 100) as i64;
    let draw = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
    let actual_ms = jittered_ms(base_ms, draw);

    if actual_ms > 10 {
        let sleep_ms = actual_ms * 7 / 10;
        thread::sleep(Duration::from_millis(sleep_ms));
        clock::busy_wait_us((actual_ms - sleep_ms) * 1000);
    } else {
        clock::busy_wait_us(actual_ms * 1000);
    }
    Duration::from_millis(actual_ms)
}
