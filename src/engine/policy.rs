//! Signal fusion and verdicts.

use std::fmt;

/// Threat level above which an analysis counts toward the detection streak.
pub const DETECTION_THRESHOLD: f32 = 0.7;

/// Per-detector threshold for the boolean anomaly flags.
const FLAG_THRESHOLD: f32 = 0.5;

const TIMING_WEIGHT: f64 = 0.20;
const CACHE_WEIGHT: f64 = 0.20;
const PERF_BLOCKED_WEIGHT: f64 = 0.15;
const MEMORY_WEIGHT: f64 = 0.15;
const JAILBREAK_WEIGHT: f64 = 0.15;
const DEBUGGER_WEIGHT: f64 = 0.10;
const CODESIGN_WEIGHT: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Suspicious,
    Instrumented,
    /// Above the detection threshold: observation is very likely.
    Compromised,
}

/// Raw detector outputs, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorScores {
    pub timing: f32,
    pub cache: f32,
    pub perf_blocked: f32,
    pub memory: f32,
    pub jailbreak: f32,
    pub debugger: f32,
    pub codesign: f32,
}

impl DetectorScores {
    pub fn threat_level(&self) -> f32 {
        let weighted = TIMING_WEIGHT * self.timing as f64
            + CACHE_WEIGHT * self.cache as f64
            + PERF_BLOCKED_WEIGHT * self.perf_blocked as f64
            + MEMORY_WEIGHT * self.memory as f64
            + JAILBREAK_WEIGHT * self.jailbreak as f64
            + DEBUGGER_WEIGHT * self.debugger as f64
            + CODESIGN_WEIGHT * self.codesign as f64;
        weighted.clamp(0.0, 1.0) as f32
    }

    /// Platform-integrity evidence only; timing signals are too noisy to
    /// attribute to a hypervisor on their own.
    pub fn hypervisor_confidence(&self) -> f32 {
        ((self.jailbreak + self.debugger) / 2.0).clamp(0.0, 1.0)
    }

    pub fn into_analysis(self, analysis_timestamp: u64) -> ThreatAnalysis {
        ThreatAnalysis {
            threat_level: self.threat_level(),
            hypervisor_confidence: self.hypervisor_confidence(),
            timing_anomaly_detected: self.timing > FLAG_THRESHOLD,
            cache_anomaly_detected: self.cache > FLAG_THRESHOLD,
            perf_counter_blocked: self.perf_blocked > FLAG_THRESHOLD,
            memory_anomaly_detected: self.memory > FLAG_THRESHOLD,
            analysis_timestamp,
        }
    }
}

/// Result of one `analyze_threat()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThreatAnalysis {
    pub threat_level: f32,
    pub hypervisor_confidence: f32,
    pub timing_anomaly_detected: bool,
    pub cache_anomaly_detected: bool,
    pub perf_counter_blocked: bool,
    pub memory_anomaly_detected: bool,
    pub analysis_timestamp: u64,
}

impl ThreatAnalysis {
    /// Thresholds:
    /// - below 0.2: Clean
    /// - 0.2 to below 0.5: Suspicious
    /// - 0.5 to 0.7: Instrumented
    /// - above 0.7: Compromised
    pub fn verdict(&self) -> Verdict {
        if self.threat_level > DETECTION_THRESHOLD {
            Verdict::Compromised
        } else if self.threat_level >= 0.5 {
            Verdict::Instrumented
        } else if self.threat_level >= 0.2 {
            Verdict::Suspicious
        } else {
            Verdict::Clean
        }
    }

    pub fn is_detection(&self) -> bool {
        self.threat_level > DETECTION_THRESHOLD
    }
}

impl fmt::Display for ThreatAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Threat: {:.3} | Verdict: {:?}", self.threat_level, self.verdict())?;
        writeln!(f, "Hypervisor confidence: {:.3}", self.hypervisor_confidence)?;
        writeln!(f, "Anomalies:")?;
        writeln!(f, "  timing: {}", self.timing_anomaly_detected)?;
        writeln!(f, "  cache: {}", self.cache_anomaly_detected)?;
        writeln!(f, "  perf counters blocked: {}", self.perf_counter_blocked)?;
        write!(f, "  memory: {}", self.memory_anomaly_detected)
    }
}
