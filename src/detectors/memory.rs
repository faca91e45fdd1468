//! Cache miss-rate drift against the calibrated baseline.

use crate::engine::baseline::Baseline;
use crate::telemetry::{PerfSnapshot, PerformanceTelemetry};

pub fn score_miss_rate(snapshot: &PerfSnapshot, baseline_miss_rate: f64) -> f32 {
    let miss_rate = match snapshot.cache_miss_rate() {
        Some(rate) if baseline_miss_rate > 0.0 => rate,
        _ => return 0.0,
    };
    let deviation = (miss_rate - baseline_miss_rate).abs() / baseline_miss_rate;
    if deviation > 1.0 {
        0.7
    } else if deviation > 0.5 {
        0.4
    } else {
        0.0
    }
}

/// Unreadable counters are scored by the perf-counter detector, not here.
pub fn detect_memory_anomalies(telemetry: Option<&PerformanceTelemetry>, baseline: &Baseline) -> f32 {
    match telemetry.map(PerformanceTelemetry::read_counters) {
        Some(Ok(snapshot)) => score_miss_rate(&snapshot, baseline.avg_cache_miss_rate),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_rate(references: u64, misses: u64) -> PerfSnapshot {
        PerfSnapshot {
            cache_references: references,
            cache_misses: misses,
            ..PerfSnapshot::default()
        }
    }

    #[test]
    fn deviation_bands() {
        // Baseline 5%.
        assert_eq!(score_miss_rate(&with_rate(1000, 50), 0.05), 0.0);
        assert_eq!(score_miss_rate(&with_rate(1000, 70), 0.05), 0.0);
        assert_eq!(score_miss_rate(&with_rate(1000, 80), 0.05), 0.4);
        assert_eq!(score_miss_rate(&with_rate(1000, 100), 0.05), 0.4);
        assert_eq!(score_miss_rate(&with_rate(1000, 110), 0.05), 0.7);
        assert_eq!(score_miss_rate(&with_rate(1000, 10), 0.05), 0.4);
    }

    #[test]
    fn missing_inputs_score_zero() {
        assert_eq!(score_miss_rate(&with_rate(0, 0), 0.05), 0.0);
        assert_eq!(score_miss_rate(&with_rate(1000, 900), 0.0), 0.0);
        assert_eq!(detect_memory_anomalies(None, &Baseline::default()), 0.0);
    }
}
