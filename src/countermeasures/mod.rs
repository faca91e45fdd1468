//! Active countermeasures. None of these depend on the detection engine;
//! the application invokes them around sensitive work or on teardown.

pub mod cache_probe;
pub mod memory;
pub mod timing;

pub use cache_probe::{fill_cache_with_noise, flush_cache_range, poison_cache, prefetch_cache_range};
pub use memory::{
    create_decoy_patterns, fill_available_ram, overwrite_with_pattern, scramble_memory,
    secure_wipe, secure_wipe_raw, RamFillReport,
};
pub use timing::{
    add_timing_noise, execute_with_obfuscation, exponential_delay_us, jitter_sleep_ms,
    random_delay_us,
};
