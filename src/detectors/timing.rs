//! Instruction-latency drift against the calibrated baseline.
//!
//! Single-stepping, DBI, and hypervisor trap-and-emulate all stretch a fixed
//! integer loop well past its native cost. Five trials are compared against
//! the baseline mean; each trial deviating by more than 50% adds 0.2.

use crate::engine::baseline::Baseline;
use crate::platform::clock;

pub const LOOP_ITERATIONS: u64 = 1000;
pub const TRIALS: usize = 5;
const DEVIATION_THRESHOLD: f64 = 0.5;

/// Cycles taken by the fixed 1000-iteration additive loop.
pub fn instruction_loop_latency() -> u64 {
    clock::measure(|| {
        let mut acc: u64 = 0;
        for i in 0..LOOP_ITERATIONS {
            acc = std::hint::black_box(acc.wrapping_add(i));
        }
        std::hint::black_box(acc);
    })
}

/// Fraction of `latencies` deviating from `baseline_latency` by more than 50%.
/// A zero baseline counts every trial as on-baseline.
pub fn score_latencies(latencies: &[u64], baseline_latency: f64) -> f32 {
    if latencies.is_empty() {
        return 0.0;
    }
    let anomalies = latencies
        .iter()
        .filter(|&&latency| {
            let deviation = if baseline_latency > 0.0 {
                (latency as f64 - baseline_latency).abs() / baseline_latency
            } else {
                0.0
            };
            deviation > DEVIATION_THRESHOLD
        })
        .count();
    anomalies as f32 / latencies.len() as f32
}

pub fn detect_timing_anomalies(baseline: &Baseline) -> f32 {
    let latencies: Vec<u64> = (0..TRIALS).map(|_| instruction_loop_latency()).collect();
    let score = score_latencies(&latencies, baseline.avg_instruction_latency);

    tracing::debug!(
        min = latencies.iter().min().copied().unwrap_or(0),
        max = latencies.iter().max().copied().unwrap_or(0),
        baseline = baseline.avg_instruction_latency,
        score,
        "instruction timing trials"
    );
    score
}
