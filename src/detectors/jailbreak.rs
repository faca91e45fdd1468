//! Tamper-framework artifacts: known files, a writable sandbox boundary,
//! and injected hooking libraries.

use crate::platform::{IntegrityProbe, JailbreakIndicators};

const PATH_WEIGHT: f32 = 0.3;
const WRITABLE_WEIGHT: f32 = 0.3;
const LIBRARY_WEIGHT: f32 = 0.2;

pub fn detect_jailbreak(probe: &dyn IntegrityProbe, indicators: &JailbreakIndicators) -> f32 {
    let mut score = 0.0f32;

    for path in &indicators.tamper_paths {
        if probe.path_exists(path) {
            tracing::debug!(path = %path, "tamper framework artifact present");
            score += PATH_WEIGHT;
        }
    }

    if probe.is_path_writable(&indicators.restricted_dir) {
        tracing::debug!(dir = %indicators.restricted_dir, "restricted directory is writable");
        score += WRITABLE_WEIGHT;
    }

    for image in probe.loaded_images() {
        if indicators
            .library_markers
            .iter()
            .any(|marker| image.contains(marker.as_str()))
        {
            tracing::debug!(image = %image, "hooking library loaded");
            score += LIBRARY_WEIGHT;
        }
    }

    score.min(1.0)
}
