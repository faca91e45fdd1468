//! Targets without a telemetry backend. Every OS query reports failure, so
//! the engine stays inert rather than guessing.

use std::sync::OnceLock;
use std::time::Instant;

use super::{probe_writable, IntegrityProbe, SystemInspector, TaskSnapshot, Timebase, VmStatistics};
use crate::error::{DefenseError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct HostInspector;

impl SystemInspector for HostInspector {
    fn timebase(&self) -> Result<Timebase> {
        Ok(Timebase::NANOS)
    }

    fn absolute_time(&self) -> u64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }

    fn task_snapshot(&self) -> Result<TaskSnapshot> {
        Err(DefenseError::OsQuery {
            call: "task_snapshot",
            code: -1,
        })
    }

    fn vm_statistics(&self) -> Result<VmStatistics> {
        Err(DefenseError::OsQuery {
            call: "vm_statistics",
            code: -1,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIntegrityProbe;

impl IntegrityProbe for SystemIntegrityProbe {
    fn path_exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }

    fn is_path_writable(&self, dir: &str) -> bool {
        probe_writable(dir)
    }

    fn loaded_images(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_being_traced(&self) -> bool {
        false
    }
}
