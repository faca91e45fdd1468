//! Cache-hierarchy compression check.
//!
//! Native memory hierarchies show a sharp gap between a warm sweep and a
//! sweep after flushing. An interception layer that virtualizes memory or
//! timing tends to flatten that gap.

use crate::countermeasures::cache_probe::{flush_cache_range, read_sweep};
use crate::countermeasures::memory::try_alloc_zeroed;
use crate::platform::clock;

pub const PROBE_BUFFER_SIZE: usize = 64 * 1024;

/// Uncached / cached sweep latency, or `None` if the probe buffer could not be allocated.
pub fn measure_cache_ratio() -> Option<f64> {
    let mut buffer = match try_alloc_zeroed(PROBE_BUFFER_SIZE) {
        Ok(buffer) => buffer,
        Err(err) => {
            tracing::warn!(error = %err, "cache probe allocation failed");
            return None;
        }
    };
    // Distinct per-line content so the pages are really backed.
    for (i, byte) in buffer.iter_mut().enumerate().step_by(64) {
        *byte = i as u8;
    }

    read_sweep(&buffer);
    let cached_latency = clock::measure(|| {
        read_sweep(&buffer);
    });

    flush_cache_range(&buffer);
    let uncached_latency = clock::measure(|| {
        read_sweep(&buffer);
    });

    let ratio = uncached_latency as f64 / (cached_latency as f64 + 1.0);
    tracing::debug!(cached_latency, uncached_latency, ratio, "cache probe");
    Some(ratio)
}

pub fn score_cache_ratio(ratio: f64) -> f32 {
    if ratio < 2.0 {
        0.8
    } else if ratio < 3.0 {
        0.4
    } else {
        0.0
    }
}

pub fn detect_cache_anomalies() -> f32 {
    measure_cache_ratio().map_or(0.0, score_cache_ratio)
}
