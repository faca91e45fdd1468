use runtime_shield::countermeasures::{execute_with_obfuscation, jitter_sleep_ms, secure_wipe};
use runtime_shield::engine::responses::apply_response;
use runtime_shield::{ShieldConfig, ThreatDetectionEngine, Verdict};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("==================================================");
    println!("        Runtime Shield: Observation Detection     ");
    println!("==================================================");

    let config = ShieldConfig::from_env();
    tracing::debug!(?config, "configuration loaded");
    let counter_hz = runtime_shield::platform::clock::init();
    tracing::debug!(counter_hz, "cycle counter ready");

    // ===================================================================
    // BASELINE CALIBRATION
    // ===================================================================

    println!("\n[*] Phase 1: Baseline Calibration");
    let engine = ThreatDetectionEngine::new();
    match engine.initialize() {
        Ok(()) => {
            if let Some(baseline) = engine.baseline() {
                println!(
                    "[+] Baseline: cache sweep {:.0} cycles, instruction loop {:.0} cycles",
                    baseline.avg_cache_latency, baseline.avg_instruction_latency
                );
            }
        }
        Err(err) => {
            // The engine stays usable; every analysis will report zero threat.
            println!("[!] Calibration failed: {}. Detection is inert.", err);
        }
    }

    // ===================================================================
    // REPEATED ANALYSIS
    // ===================================================================

    println!("\n[*] Phase 2: Threat Analysis ({} rounds)", config.analysis_rounds);
    let mut worst = Verdict::Clean;
    for round in 1..=config.analysis_rounds {
        let analysis = engine.analyze_threat();
        println!("\n--- Round {} ---\n{}", round, analysis);
        println!("Consecutive detections: {}", engine.consecutive_detections());

        worst = worse_of(worst, analysis.verdict());
        if round < config.analysis_rounds {
            jitter_sleep_ms(config.analysis_interval_ms, config.interval_jitter_percent);
        }
    }

    // ===================================================================
    // RESPONSE
    // ===================================================================

    println!("\n[*] Phase 3: Response (worst verdict: {:?})", worst);
    let report = apply_response(worst, &config);
    println!(
        "[*] Cache poisoned: {} KiB | Decoys: {} bytes | RAM pressure: {} bytes",
        report.cache_poison_kb, report.decoy_bytes, report.ram_filled_bytes
    );

    // ===================================================================
    // PROTECTED PAYLOAD
    // ===================================================================

    println!("\n[*] Phase 4: Protected Payload");
    let mut secret = execute_with_obfuscation(payload, config.chaos_percent);
    println!("[+] Payload produced {} bytes of sensitive output.", secret.len());
    secure_wipe(&mut secret);
    println!("[+] Sensitive output wiped.");
}

fn worse_of(a: Verdict, b: Verdict) -> Verdict {
    fn rank(v: Verdict) -> u8 {
        match v {
            Verdict::Clean => 0,
            Verdict::Suspicious => 1,
            Verdict::Instrumented => 2,
            Verdict::Compromised => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

fn payload() -> Vec<u8> {
    b"SECRET: The answer is 42.".to_vec()
}
