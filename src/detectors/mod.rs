//! The seven signals fused by the threat engine. Each returns a score in `[0, 1]`.

pub mod cache;
pub mod codesign;
pub mod debugger;
pub mod jailbreak;
pub mod memory;
pub mod perf_counters;
pub mod timing;
