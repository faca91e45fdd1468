//! Estimated performance counters.
//!
//! The target platform exposes no PMU to user space. Only `cycles` is
//! measured; every other counter is derived from it with fixed ratios that
//! the detector thresholds were tuned against:
//!
//! - IPC is assumed to be 2.0
//! - 30% of instructions touch memory, 5% of those miss
//! - 20% of instructions are branches, 5% of those mispredict
//!
//! Do not refine these without re-deriving the fusion thresholds.

use std::sync::Arc;

use crate::error::{DefenseError, Result};
use crate::platform::{clock, SystemInspector, TaskSnapshot, Timebase};

/// One approximate counter reading. Fields come from several OS queries made
/// in sequence, so the snapshot spans a few microseconds rather than an instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfSnapshot {
    pub cycles: u64,
    pub instructions: u64,
    pub cache_references: u64,
    pub cache_misses: u64,
    pub branch_instructions: u64,
    pub branch_misses: u64,
    pub context_switches: u64,
    pub cpu_migrations: u64,
    pub resident_size: u64,
    pub virtual_size: u64,
    pub thread_count: u32,
}

impl PerfSnapshot {
    /// Builds a snapshot from a measured cycle delta and task counters.
    pub fn derive(cycles: u64, task: &TaskSnapshot) -> Self {
        let instructions = cycles.saturating_mul(2);
        // instructions * 3 / 10 without overflowing the multiply.
        let cache_references = instructions / 10 * 3 + instructions % 10 * 3 / 10;
        let cache_misses = cache_references / 20;
        let branch_instructions = instructions / 5;
        let branch_misses = branch_instructions / 20;

        Self {
            cycles,
            instructions,
            cache_references,
            cache_misses,
            branch_instructions,
            branch_misses,
            context_switches: task.context_switches,
            cpu_migrations: task.suspend_count,
            resident_size: task.resident_size,
            virtual_size: task.virtual_size,
            thread_count: task.thread_count,
        }
    }

    /// Cycles per instruction, or `None` when either counter is zero.
    pub fn cycles_per_instruction(&self) -> Option<f64> {
        if self.cycles == 0 || self.instructions == 0 {
            return None;
        }
        Some(self.cycles as f64 / self.instructions as f64)
    }

    pub fn cache_miss_rate(&self) -> Option<f64> {
        if self.cache_references == 0 {
            return None;
        }
        Some(self.cache_misses as f64 / self.cache_references as f64)
    }
}

#[derive(Debug, Clone, Copy)]
struct TelemetryBaseline {
    timebase: Timebase,
    absolute_time: u64,
    cycles: u64,
}

/// Counter estimator bound to one process.
pub struct PerformanceTelemetry {
    inspector: Arc<dyn SystemInspector>,
    baseline: Option<TelemetryBaseline>,
}

impl PerformanceTelemetry {
    pub fn new(inspector: Arc<dyn SystemInspector>) -> Self {
        Self {
            inspector,
            baseline: None,
        }
    }

    /// Captures the time base, baseline clocks and a VM snapshot, and
    /// resolves the cycle counter frequency.
    /// Fails if any OS query fails; the handle then stays uninitialized.
    pub fn initialize(&mut self) -> Result<()> {
        // Confirms task introspection works before committing to a baseline.
        self.inspector.task_snapshot()?;
        let timebase = self.inspector.timebase()?;
        let vm = self.inspector.vm_statistics()?;

        let counter_hz = clock::init();

        let baseline = TelemetryBaseline {
            timebase,
            absolute_time: self.inspector.absolute_time(),
            cycles: clock::cycles(),
        };
        tracing::debug!(
            timebase_numer = timebase.numer,
            timebase_denom = timebase.denom,
            counter_hz,
            available_bytes = vm.available_bytes(),
            "telemetry baseline captured"
        );
        self.baseline = Some(baseline);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn read_counters(&self) -> Result<PerfSnapshot> {
        let baseline = self.baseline.ok_or(DefenseError::NotInitialized)?;
        let cycles = clock::cycles().saturating_sub(baseline.cycles);
        let task = self.inspector.task_snapshot()?;
        // A failing VM query fails the read as well.
        self.inspector.vm_statistics()?;
        Ok(PerfSnapshot::derive(cycles, &task))
    }

    /// Coarse health check: does a minimal VM query still succeed?
    pub fn are_counters_accessible(&self) -> bool {
        self.inspector.vm_statistics().is_ok()
    }

    /// Nanoseconds since `initialize()`, per the platform time base.
    pub fn elapsed_nanos(&self) -> Option<u64> {
        let baseline = self.baseline?;
        let ticks = self
            .inspector
            .absolute_time()
            .saturating_sub(baseline.absolute_time);
        Some(baseline.timebase.to_nanos(ticks))
    }
}
