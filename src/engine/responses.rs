use crate::config::ShieldConfig;
use crate::countermeasures::{
    add_timing_noise, create_decoy_patterns, fill_available_ram, poison_cache,
};
use crate::engine::policy::Verdict;

/// What a response actually did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseReport {
    pub cache_poison_kb: usize,
    pub decoy_bytes: usize,
    pub ram_filled_bytes: u64,
}

/// Applies countermeasures scaled to the verdict.
///
/// Responses degrade what an observer can learn; they never terminate the
/// process or touch anything outside it:
/// - Suspicious: light cache poisoning and timing noise
/// - Instrumented: heavy cache poisoning and decoy memory
/// - Compromised: full cache poisoning, decoys and RAM pressure
pub fn apply_response(verdict: Verdict, config: &ShieldConfig) -> ResponseReport {
    let mut report = ResponseReport::default();
    if !config.enable_countermeasures {
        return report;
    }

    match verdict {
        Verdict::Clean => {}
        Verdict::Suspicious => {
            tracing::info!("suspicious environment, adding cache and timing noise");
            report.cache_poison_kb = poison_cache(25);
            add_timing_noise(50);
        }
        Verdict::Instrumented => {
            tracing::warn!("instrumentation suspected, poisoning cache and planting decoys");
            report.cache_poison_kb = poison_cache(75);
            report.decoy_bytes = create_decoy_patterns(config.decoy_mb);
        }
        Verdict::Compromised => {
            tracing::warn!("observation detected, engaging all countermeasures");
            report.cache_poison_kb = poison_cache(100);
            report.decoy_bytes = create_decoy_patterns(config.decoy_mb);
            report.ram_filled_bytes = fill_available_ram(config.ram_fill_percent).allocated_bytes;
        }
    }
    report
}
