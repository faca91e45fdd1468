//! Device-specific baseline calibration.
//!
//! Ten samples, 10 ms apart, of: a 1 MiB read sweep, the fixed instruction
//! loop, and an estimated-counter snapshot. The means become the reference
//! every later analysis is compared against.

use std::thread;
use std::time::Duration;

use crate::countermeasures::cache_probe::read_sweep;
use crate::countermeasures::memory::try_alloc_zeroed;
use crate::detectors::timing::instruction_loop_latency;
use crate::error::Result;
use crate::platform::clock;
use crate::telemetry::PerformanceTelemetry;

pub const CALIBRATION_SAMPLES: usize = 10;
pub const CALIBRATION_BUFFER_SIZE: usize = 1 << 20;
const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Baseline {
    /// Mean cycles for one read sweep over a fresh 1 MiB buffer.
    pub avg_cache_latency: f64,
    /// Mean cycles for the 1000-iteration instruction loop.
    pub avg_instruction_latency: f64,
    /// 0 if counters were never readable.
    pub avg_cycles_per_instruction: f64,
    /// 0 if counters were never readable.
    pub avg_cache_miss_rate: f64,
    /// Cycle counter at the end of calibration.
    pub baseline_timestamp: u64,
}

#[derive(Debug, Default)]
struct Accumulator {
    cache_latency: f64,
    instruction_latency: f64,
    cycles_per_instruction: f64,
    cache_miss_rate: f64,
}

pub fn calibrate(telemetry: &PerformanceTelemetry) -> Result<Baseline> {
    let mut sums = Accumulator::default();

    for sample in 0..CALIBRATION_SAMPLES {
        let buffer = try_alloc_zeroed(CALIBRATION_BUFFER_SIZE)?;
        sums.cache_latency += clock::measure(|| {
            read_sweep(&buffer);
        }) as f64;
        drop(buffer);

        sums.instruction_latency += instruction_loop_latency() as f64;

        match telemetry.read_counters() {
            Ok(snapshot) => {
                if let (Some(cpi), Some(miss_rate)) =
                    (snapshot.cycles_per_instruction(), snapshot.cache_miss_rate())
                {
                    sums.cycles_per_instruction += cpi;
                    sums.cache_miss_rate += miss_rate;
                }
            }
            Err(err) => tracing::debug!(sample, error = %err, "counters unavailable during calibration"),
        }

        thread::sleep(SAMPLE_INTERVAL);
    }

    let n = CALIBRATION_SAMPLES as f64;
    let baseline = Baseline {
        avg_cache_latency: sums.cache_latency / n,
        avg_instruction_latency: sums.instruction_latency / n,
        avg_cycles_per_instruction: sums.cycles_per_instruction / n,
        avg_cache_miss_rate: sums.cache_miss_rate / n,
        baseline_timestamp: clock::cycles(),
    };
    tracing::info!(
        cache_latency = baseline.avg_cache_latency,
        instruction_latency = baseline.avg_instruction_latency,
        cpi = baseline.avg_cycles_per_instruction,
        miss_rate = baseline.avg_cache_miss_rate,
        "baseline calibrated"
    );
    Ok(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::tests::FakeInspector;
    use std::sync::Arc;

    #[test]
    fn calibration_with_readable_counters() {
        let mut telemetry = PerformanceTelemetry::new(Arc::new(FakeInspector::new(10, 10, 4096)));
        telemetry.initialize().expect("fake telemetry");
        let before = clock::cycles();
        let baseline = calibrate(&telemetry).expect("calibration succeeds");

        assert!(baseline.avg_cache_latency > 0.0);
        assert!(baseline.avg_instruction_latency > 0.0);
        // Derived counters give CPI 0.5 exactly. The miss rate is 5% up to
        // the floor in `references / 20`, at most 20 / references below it.
        assert!((baseline.avg_cycles_per_instruction - 0.5).abs() < 1e-9);
        assert!(baseline.avg_cache_miss_rate <= 0.05 + 1e-12);
        assert!(baseline.avg_cache_miss_rate > 0.05 - 1e-3, "{}", baseline.avg_cache_miss_rate);
        assert!(baseline.baseline_timestamp >= before);
    }

    #[test]
    fn calibration_without_counters_leaves_ratios_zero() {
        let telemetry = PerformanceTelemetry::new(Arc::new(FakeInspector::new(10, 10, 4096)));
        let baseline = calibrate(&telemetry).expect("calibration succeeds");
        assert_eq!(baseline.avg_cycles_per_instruction, 0.0);
        assert_eq!(baseline.avg_cache_miss_rate, 0.0);
        assert!(baseline.avg_instruction_latency > 0.0);
    }
}
