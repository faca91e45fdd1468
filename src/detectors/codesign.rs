//! Code-signing tamper check.

/// Always 0.0. No verification is performed: what a "tampered" signature
/// means on the target platform is undecided, so this signal carries its
/// 5% weight in the fusion but never fires.
pub fn detect_code_signing_tampering() -> f32 {
    0.0
}
