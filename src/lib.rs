//! Runtime self-defense for a mobile endpoint.
//!
//! Detects observation by a hypervisor, tamper framework, or debugger
//! ([`ThreatDetectionEngine`]) and degrades forensic cache, timing, and
//! memory analysis ([`countermeasures`]).

pub mod config;
pub mod countermeasures;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod platform;
pub mod telemetry;

pub use config::ShieldConfig;
pub use engine::baseline::Baseline;
pub use engine::policy::{DetectorScores, ThreatAnalysis, Verdict};
pub use engine::threat::ThreatDetectionEngine;
pub use error::{DefenseError, Result};
pub use platform::{IntegrityProbe, JailbreakIndicators, SystemInspector};
pub use telemetry::{PerfSnapshot, PerformanceTelemetry};
