use thiserror::Error;

/// Errors surfaced by telemetry, calibration, and the countermeasure toolkits.
///
/// `analyze_threat()` never returns one of these; detectors translate them
/// into fallback scores so the fused result is always computable.
#[derive(Debug, Error)]
pub enum DefenseError {
    #[error("component used before initialize()")]
    NotInitialized,

    #[error("OS query {call} failed with code {code}")]
    OsQuery { call: &'static str, code: i32 },

    #[error("could not parse {source_name}: {detail}")]
    Parse {
        source_name: &'static str,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },

    #[error("secure random source failed: {0}")]
    Entropy(#[from] rand::Error),
}

pub type Result<T> = std::result::Result<T, DefenseError>;
