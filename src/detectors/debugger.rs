//! Debugger attachment via the kernel's traced flag.
//!
//! `P_TRACED` on Darwin, `TracerPid` on Linux. Both are trivially hidden by
//! a kernel-level attacker, which is why this is one signal among seven.

use crate::platform::IntegrityProbe;

pub fn detect_debugger(probe: &dyn IntegrityProbe) -> f32 {
    if probe.is_being_traced() {
        tracing::info!("process is being traced");
        1.0
    } else {
        0.0
    }
}
