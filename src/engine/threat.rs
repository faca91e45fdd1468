//! The fused threat-detection engine.
//!
//! `initialize()` calibrates a baseline once; each `analyze_threat()` re-runs
//! all seven detectors and fuses them. Engine state sits behind a mutex so
//! concurrent callers see a consistent detection streak.

use std::sync::Arc;

use parking_lot::Mutex;

use super::baseline::{self, Baseline};
use super::policy::{DetectorScores, ThreatAnalysis};
use crate::detectors;
use crate::error::Result;
use crate::platform::{
    clock, HostInspector, IntegrityProbe, JailbreakIndicators, SystemInspector,
    SystemIntegrityProbe,
};
use crate::telemetry::PerformanceTelemetry;

#[derive(Default)]
struct EngineState {
    initialized: bool,
    baseline: Baseline,
    last_analysis_time: u64,
    consecutive_detections: u32,
    telemetry: Option<PerformanceTelemetry>,
}

impl EngineState {
    /// Extends the streak on a detection, resets it otherwise.
    fn record_threat_level(&mut self, threat_level: f32) -> u32 {
        if threat_level > super::policy::DETECTION_THRESHOLD {
            self.consecutive_detections = self.consecutive_detections.saturating_add(1);
        } else {
            self.consecutive_detections = 0;
        }
        self.consecutive_detections
    }
}

pub struct ThreatDetectionEngine {
    inspector: Arc<dyn SystemInspector>,
    probe: Box<dyn IntegrityProbe>,
    indicators: JailbreakIndicators,
    state: Mutex<EngineState>,
}

impl ThreatDetectionEngine {
    /// Engine bound to the host OS.
    pub fn new() -> Self {
        Self::with_platform(Arc::new(HostInspector), Box::new(SystemIntegrityProbe))
    }

    pub fn with_platform(inspector: Arc<dyn SystemInspector>, probe: Box<dyn IntegrityProbe>) -> Self {
        Self {
            inspector,
            probe,
            indicators: JailbreakIndicators::default(),
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn with_indicators(mut self, indicators: JailbreakIndicators) -> Self {
        self.indicators = indicators;
        self
    }

    /// Brings up telemetry and calibrates the baseline. Idempotent once it
    /// has succeeded; on failure the engine stays inert.
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.initialized {
            return Ok(());
        }

        let mut telemetry = PerformanceTelemetry::new(Arc::clone(&self.inspector));
        if let Err(err) = telemetry.initialize() {
            tracing::warn!(error = %err, "telemetry initialization failed, engine stays inert");
            return Err(err);
        }

        let baseline = match baseline::calibrate(&telemetry) {
            Ok(baseline) => baseline,
            Err(err) => {
                tracing::warn!(error = %err, "baseline calibration failed, engine stays inert");
                return Err(err);
            }
        };

        state.telemetry = Some(telemetry);
        state.baseline = baseline;
        state.initialized = true;
        state.last_analysis_time = clock::cycles();
        tracing::info!("threat detection engine initialized");
        Ok(())
    }

    /// Runs every detector and fuses the result. Before a successful
    /// `initialize()` this is an all-zero analysis.
    pub fn analyze_threat(&self) -> ThreatAnalysis {
        self.analyze_with(|engine, state| engine.run_detectors(state))
    }

    /// Fuses the scores `detect` produces and updates the streak, all under
    /// the state lock.
    fn analyze_with<F>(&self, detect: F) -> ThreatAnalysis
    where
        F: FnOnce(&Self, &EngineState) -> DetectorScores,
    {
        let mut state = self.state.lock();
        if !state.initialized {
            return ThreatAnalysis::default();
        }

        let scores = detect(self, &*state);
        let now = clock::cycles();
        let analysis = scores.into_analysis(now);
        let streak = state.record_threat_level(analysis.threat_level);
        state.last_analysis_time = now;

        let uptime_ns = state.telemetry.as_ref().and_then(PerformanceTelemetry::elapsed_nanos);
        tracing::debug!(?scores, ?uptime_ns, "detector scores");
        if analysis.is_detection() {
            tracing::warn!(
                threat_level = analysis.threat_level,
                hypervisor_confidence = analysis.hypervisor_confidence,
                consecutive_detections = streak,
                "observation detected"
            );
        } else {
            tracing::info!(threat_level = analysis.threat_level, "analysis complete");
        }
        analysis
    }

    fn run_detectors(&self, state: &EngineState) -> DetectorScores {
        let telemetry = state.telemetry.as_ref();
        DetectorScores {
            timing: detectors::timing::detect_timing_anomalies(&state.baseline),
            cache: detectors::cache::detect_cache_anomalies(),
            perf_blocked: detectors::perf_counters::detect_perf_counter_blocking(telemetry),
            memory: detectors::memory::detect_memory_anomalies(telemetry, &state.baseline),
            jailbreak: detectors::jailbreak::detect_jailbreak(self.probe.as_ref(), &self.indicators),
            debugger: detectors::debugger::detect_debugger(self.probe.as_ref()),
            codesign: detectors::codesign::detect_code_signing_tampering(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Analyses in a row whose threat level exceeded 0.7.
    pub fn consecutive_detections(&self) -> u32 {
        self.state.lock().consecutive_detections
    }

    pub fn baseline(&self) -> Option<Baseline> {
        let state = self.state.lock();
        state.initialized.then_some(state.baseline)
    }

    pub fn last_analysis_time(&self) -> u64 {
        self.state.lock().last_analysis_time
    }

    /// Telemetry health check; false before initialization.
    pub fn counters_accessible(&self) -> bool {
        self.state
            .lock()
            .telemetry
            .as_ref()
            .map_or(false, PerformanceTelemetry::are_counters_accessible)
    }
}

impl Default for ThreatDetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::tests::FakeInspector;
    use std::sync::atomic::Ordering;

    struct QuietProbe;

    impl IntegrityProbe for QuietProbe {
        fn path_exists(&self, _path: &str) -> bool {
            false
        }
        fn is_path_writable(&self, _dir: &str) -> bool {
            false
        }
        fn loaded_images(&self) -> Vec<String> {
            Vec::new()
        }
        fn is_being_traced(&self) -> bool {
            false
        }
    }

    #[test]
    fn streak_counts_consecutive_detections() {
        let mut state = EngineState::default();
        let streak: Vec<u32> = [0.8, 0.9, 0.3, 0.75]
            .into_iter()
            .map(|level| state.record_threat_level(level))
            .collect();
        assert_eq!(streak, vec![1, 2, 0, 1]);
        assert_eq!(state.consecutive_detections, 1);
    }

    #[test]
    fn threshold_itself_resets_streak() {
        let mut state = EngineState::default();
        state.record_threat_level(0.9);
        assert_eq!(state.record_threat_level(0.7), 0);
    }

    #[test]
    fn uninitialized_engine_reports_zero() {
        let engine = ThreatDetectionEngine::with_platform(
            Arc::new(FakeInspector::new(1, 1, 4096)),
            Box::new(QuietProbe),
        );
        assert_eq!(engine.analyze_threat(), ThreatAnalysis::default());
        assert_eq!(engine.consecutive_detections(), 0);
        assert!(engine.baseline().is_none());
        assert!(!engine.counters_accessible());
    }

    #[test]
    fn failed_telemetry_leaves_engine_inert() {
        let inspector = Arc::new(FakeInspector::new(1, 1, 4096));
        inspector.fail_vm.store(true, Ordering::SeqCst);
        let engine = ThreatDetectionEngine::with_platform(inspector.clone(), Box::new(QuietProbe));

        assert!(engine.initialize().is_err());
        assert!(!engine.is_initialized());
        assert_eq!(engine.analyze_threat().threat_level, 0.0);

        inspector.fail_vm.store(false, Ordering::SeqCst);
        engine.initialize().expect("recovers once the OS query works");
        assert!(engine.is_initialized());
    }

    #[test]
    fn analysis_advances_last_analysis_time() {
        let engine = ThreatDetectionEngine::with_platform(
            Arc::new(FakeInspector::new(1, 1, 4096)),
            Box::new(QuietProbe),
        );
        engine.initialize().expect("fake platform initializes");
        let before = engine.last_analysis_time();
        let analysis = engine.analyze_threat();
        assert!(engine.last_analysis_time() >= before);
        assert_eq!(engine.last_analysis_time(), analysis.analysis_timestamp);
        assert!(engine.counters_accessible());
        // Derived counters are always plausible and never drift.
        assert!(!analysis.perf_counter_blocked);
        assert!(!analysis.memory_anomaly_detected);
        assert_eq!(analysis.hypervisor_confidence, 0.0);
    }

    fn scores_at(level: f32) -> DetectorScores {
        DetectorScores {
            timing: level,
            cache: level,
            perf_blocked: level,
            memory: level,
            jailbreak: level,
            debugger: level,
            codesign: level,
        }
    }

    #[test]
    fn engine_streak_rises_and_resets() {
        let engine = ThreatDetectionEngine::with_platform(
            Arc::new(FakeInspector::new(1, 1, 4096)),
            Box::new(QuietProbe),
        );
        engine.initialize().expect("fake platform initializes");

        let mut streak = Vec::new();
        for level in [0.9, 1.0, 0.2, 0.8] {
            let analysis = engine.analyze_with(|_, _| scores_at(level));
            assert!((analysis.threat_level - level).abs() < 1e-6);
            streak.push(engine.consecutive_detections());
        }
        assert_eq!(streak, vec![1, 2, 0, 1]);

        // A real pass on a quiet platform stays below the threshold.
        assert!(!engine.analyze_threat().is_detection());
        assert_eq!(engine.consecutive_detections(), 0);
    }

    #[test]
    fn scripted_scores_ignored_before_initialize() {
        let engine = ThreatDetectionEngine::with_platform(
            Arc::new(FakeInspector::new(1, 1, 4096)),
            Box::new(QuietProbe),
        );
        let analysis = engine.analyze_with(|_, _| scores_at(1.0));
        assert_eq!(analysis, ThreatAnalysis::default());
        assert_eq!(engine.consecutive_detections(), 0);
    }

    #[test]
    fn failing_read_after_initialize_blocks_counters() {
        let inspector = Arc::new(FakeInspector::new(1, 1, 4096));
        let engine = ThreatDetectionEngine::with_platform(inspector.clone(), Box::new(QuietProbe));
        engine.initialize().expect("fake platform initializes");

        inspector.fail_task.store(true, Ordering::SeqCst);
        let mut scores = DetectorScores::default();
        let analysis = engine.analyze_with(|engine, state| {
            scores = engine.run_detectors(state);
            scores
        });
        assert_eq!(scores.perf_blocked, 0.9);
        assert_eq!(scores.memory, 0.0);
        assert!(analysis.perf_counter_blocked);
        assert!(!analysis.memory_anomaly_detected);

        inspector.fail_task.store(false, Ordering::SeqCst);
        assert!(!engine.analyze_threat().perf_counter_blocked);
    }
}
