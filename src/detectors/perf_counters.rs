//! Counter plausibility. Blocked or frozen counters are themselves a signal.

use crate::error::Result;
use crate::telemetry::{PerfSnapshot, PerformanceTelemetry};

pub fn score_perf_snapshot(snapshot: &Result<PerfSnapshot>) -> f32 {
    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(_) => return 0.9,
    };
    match snapshot.cycles_per_instruction() {
        None => 0.7,
        Some(cpi) if !(0.1..=10.0).contains(&cpi) => 0.5,
        Some(_) => 0.0,
    }
}

pub fn detect_perf_counter_blocking(telemetry: Option<&PerformanceTelemetry>) -> f32 {
    let snapshot = match telemetry {
        Some(telemetry) => telemetry.read_counters(),
        None => Err(crate::error::DefenseError::NotInitialized),
    };
    if let Err(err) = &snapshot {
        tracing::warn!(error = %err, "performance counters unreadable");
    }
    score_perf_snapshot(&snapshot)
}
