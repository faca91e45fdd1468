//! Runtime configuration for the demonstration binary.
//!
//! The library entry points take plain clamped arguments; this layer only
//! decides which arguments the binary passes, read from `RUNTIME_SHIELD_*`
//! environment variables.

#[derive(Debug, Clone)]
pub struct ShieldConfig {
    /// Number of `analyze_threat()` rounds to run.
    pub analysis_rounds: u32,
    /// Base pause between rounds, jittered by `interval_jitter_percent`.
    pub analysis_interval_ms: u64,
    pub interval_jitter_percent: u32,
    /// Chaos level used when running the protected payload.
    pub chaos_percent: u32,
    /// Size of decoy pattern region created by the response layer.
    pub decoy_mb: usize,
    /// Share of available RAM the response layer may fill on a hostile verdict.
    pub ram_fill_percent: u32,
    pub enable_countermeasures: bool,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            analysis_rounds: 3,
            analysis_interval_ms: 250,
            interval_jitter_percent: 30,
            chaos_percent: 40,
            decoy_mb: 4,
            ram_fill_percent: 10,
            enable_countermeasures: true,
        }
    }
}

impl ShieldConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            analysis_rounds: env_u32("RUNTIME_SHIELD_ANALYSIS_ROUNDS", defaults.analysis_rounds),
            analysis_interval_ms: env_u64(
                "RUNTIME_SHIELD_ANALYSIS_INTERVAL_MS",
                defaults.analysis_interval_ms,
            ),
            interval_jitter_percent: env_u32(
                "RUNTIME_SHIELD_INTERVAL_JITTER_PERCENT",
                defaults.interval_jitter_percent,
            )
            .min(100),
            chaos_percent: env_u32("RUNTIME_SHIELD_CHAOS_PERCENT", defaults.chaos_percent).min(100),
            decoy_mb: env_u64("RUNTIME_SHIELD_DECOY_MB", defaults.decoy_mb as u64) as usize,
            ram_fill_percent: env_u32("RUNTIME_SHIELD_RAM_FILL_PERCENT", defaults.ram_fill_percent)
                .min(100),
            enable_countermeasures: env_bool(
                "RUNTIME_SHIELD_ENABLE_COUNTERMEASURES",
                defaults.enable_countermeasures,
            ),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "enabled" | "on"
        ),
        Err(_) => default,
    }
}
