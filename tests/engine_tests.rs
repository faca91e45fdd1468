use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use runtime_shield::platform::{TaskSnapshot, Timebase, VmStatistics};
use runtime_shield::{
    DefenseError, IntegrityProbe, JailbreakIndicators, Result, SystemInspector,
    ThreatAnalysis, ThreatDetectionEngine,
};

struct StubInspector {
    broken: AtomicBool,
}

impl StubInspector {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            broken: AtomicBool::new(false),
        })
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            broken: AtomicBool::new(true),
        })
    }
}

impl SystemInspector for StubInspector {
    fn timebase(&self) -> Result<Timebase> {
        Ok(Timebase::NANOS)
    }

    fn absolute_time(&self) -> u64 {
        0
    }

    fn task_snapshot(&self) -> Result<TaskSnapshot> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DefenseError::OsQuery {
                call: "task_info",
                code: 1,
            });
        }
        Ok(TaskSnapshot {
            resident_size: 32 << 20,
            virtual_size: 1 << 30,
            thread_count: 2,
            context_switches: 10,
            suspend_count: 0,
        })
    }

    fn vm_statistics(&self) -> Result<VmStatistics> {
        Ok(VmStatistics {
            free_pages: 1000,
            inactive_pages: 1000,
            page_size: 16384,
        })
    }
}

/// A device with every tamper indicator present and a debugger attached.
struct HostileProbe;

impl IntegrityProbe for HostileProbe {
    fn path_exists(&self, _path: &str) -> bool {
        true
    }
    fn is_path_writable(&self, _dir: &str) -> bool {
        true
    }
    fn loaded_images(&self) -> Vec<String> {
        vec!["/Library/MobileSubstrate/DynamicLibraries/TweakInject.dylib".to_string()]
    }
    fn is_being_traced(&self) -> bool {
        true
    }
}

struct CleanProbe;

impl IntegrityProbe for CleanProbe {
    fn path_exists(&self, _path: &str) -> bool {
        false
    }
    fn is_path_writable(&self, _dir: &str) -> bool {
        false
    }
    fn loaded_images(&self) -> Vec<String> {
        vec!["/usr/lib/libSystem.B.dylib".to_string()]
    }
    fn is_being_traced(&self) -> bool {
        false
    }
}

#[test]
fn analysis_before_initialize_is_zero() {
    let engine = ThreatDetectionEngine::with_platform(StubInspector::healthy(), Box::new(HostileProbe));
    let analysis = engine.analyze_threat();
    assert_eq!(analysis, ThreatAnalysis::default());
    assert_eq!(analysis.threat_level, 0.0);
    assert_eq!(engine.consecutive_detections(), 0);
}

#[test]
fn initialize_is_idempotent() {
    let engine = ThreatDetectionEngine::with_platform(StubInspector::healthy(), Box::new(CleanProbe));
    engine.initialize().expect("first initialize");
    let baseline = engine.baseline().expect("baseline after initialize");
    engine.initialize().expect("second initialize");
    assert_eq!(engine.baseline(), Some(baseline));
}

#[test]
fn broken_telemetry_fails_initialize() {
    let engine = ThreatDetectionEngine::with_platform(StubInspector::broken(), Box::new(HostileProbe));
    let err = engine.initialize().unwrap_err();
    assert!(matches!(err, DefenseError::OsQuery { call: "task_info", .. }));
    assert!(!engine.is_initialized());
    assert_eq!(engine.analyze_threat().threat_level, 0.0);
}

#[test]
fn hostile_platform_drives_integrity_signals() {
    let engine = ThreatDetectionEngine::with_platform(StubInspector::healthy(), Box::new(HostileProbe));
    engine.initialize().expect("initialize");
    let analysis = engine.analyze_threat();

    // Jailbreak and debugger both saturate.
    assert_eq!(analysis.hypervisor_confidence, 1.0);
    // 0.15 + 0.10 from integrity alone.
    assert!(analysis.threat_level >= 0.25 - 1e-6, "{}", analysis.threat_level);
    assert!(analysis.threat_level <= 1.0);
    assert!(!analysis.perf_counter_blocked);
}

#[test]
fn clean_platform_has_no_integrity_evidence() {
    let engine = ThreatDetectionEngine::with_platform(StubInspector::healthy(), Box::new(CleanProbe));
    engine.initialize().expect("initialize");
    for _ in 0..3 {
        let analysis = engine.analyze_threat();
        assert_eq!(analysis.hypervisor_confidence, 0.0);
        // Only timing (0.20) and cache (0.20 * 0.8) can fire on a clean device.
        assert!(analysis.threat_level <= 0.36 + 1e-6, "{}", analysis.threat_level);
        assert_eq!(engine.consecutive_detections(), 0);
    }
}

#[test]
fn custom_indicators_are_used() {
    let indicators = JailbreakIndicators {
        tamper_paths: Vec::new(),
        restricted_dir: "/nonexistent".to_string(),
        library_markers: vec!["NeverLoaded".to_string()],
    };
    // Every path exists, but the custom indicator set names none.
    struct EverythingExists;
    impl IntegrityProbe for EverythingExists {
        fn path_exists(&self, _path: &str) -> bool {
            true
        }
        fn is_path_writable(&self, _dir: &str) -> bool {
            false
        }
        fn loaded_images(&self) -> Vec<String> {
            vec!["/usr/lib/libfoo.dylib".to_string()]
        }
        fn is_being_traced(&self) -> bool {
            false
        }
    }

    let engine = ThreatDetectionEngine::with_platform(StubInspector::healthy(), Box::new(EverythingExists))
        .with_indicators(indicators);
    engine.initialize().expect("initialize");
    assert_eq!(engine.analyze_threat().hypervisor_confidence, 0.0);
}

#[test]
fn concurrent_analysis_is_serialized() {
    let engine = Arc::new(ThreatDetectionEngine::with_platform(
        StubInspector::healthy(),
        Box::new(HostileProbe),
    ));
    engine.initialize().expect("initialize");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..2)
                    .map(|_| engine.analyze_threat())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let analyses: Vec<ThreatAnalysis> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("analysis thread panicked"))
        .collect();

    assert_eq!(analyses.len(), 8);
    assert!(analyses.iter().all(|a| (0.0..=1.0).contains(&a.threat_level)));
    assert!(engine.consecutive_detections() <= 8);
}

#[test]
fn counters_failing_after_initialize_are_reported_blocked() {
    let inspector = StubInspector::healthy();
    let engine = ThreatDetectionEngine::with_platform(inspector.clone(), Box::new(CleanProbe));
    engine.initialize().expect("initialize");
    assert!(!engine.analyze_threat().perf_counter_blocked);

    inspector.broken.store(true, Ordering::SeqCst);
    let analysis = engine.analyze_threat();
    assert!(analysis.perf_counter_blocked);
    assert!(!analysis.memory_anomaly_detected);
    // 0.15 * 0.9 from the blocked counters, at most 0.36 from timing and cache.
    assert!(analysis.threat_level >= 0.135 - 1e-6, "{}", analysis.threat_level);
    assert!(analysis.threat_level <= 0.495 + 1e-6, "{}", analysis.threat_level);

    inspector.broken.store(false, Ordering::SeqCst);
    assert!(!engine.analyze_threat().perf_counter_blocked);
}

#[test]
fn streak_follows_threshold_on_hostile_platform() {
    let inspector = StubInspector::healthy();
    let engine = ThreatDetectionEngine::with_platform(inspector.clone(), Box::new(HostileProbe));
    engine.initialize().expect("initialize");
    inspector.broken.store(true, Ordering::SeqCst);

    let mut expected = 0;
    for _ in 0..4 {
        let analysis = engine.analyze_threat();
        assert!(analysis.perf_counter_blocked);
        // Integrity and blocked counters give 0.385; timing and cache decide the rest.
        assert!(analysis.threat_level >= 0.385 - 1e-6, "{}", analysis.threat_level);
        expected = if analysis.threat_level > 0.7 { expected + 1 } else { 0 };
        assert_eq!(engine.consecutive_detections(), expected);
    }
}
