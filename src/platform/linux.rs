//! Linux backend: procfs parsing and `clock_gettime`.

use std::collections::BTreeSet;
use std::fs;

use super::{page_size, probe_writable, IntegrityProbe, SystemInspector, TaskSnapshot, Timebase, VmStatistics};
use crate::error::{DefenseError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct HostInspector;

impl SystemInspector for HostInspector {
    fn timebase(&self) -> Result<Timebase> {
        // CLOCK_MONOTONIC already reports nanoseconds.
        Ok(Timebase::NANOS)
    }

    fn absolute_time(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if rc != 0 {
            return 0;
        }
        (ts.tv_sec as u64)
            .saturating_mul(1_000_000_000)
            .saturating_add(ts.tv_nsec as u64)
    }

    fn task_snapshot(&self) -> Result<TaskSnapshot> {
        let status = fs::read_to_string("/proc/self/status")?;
        parse_task_status(&status)
    }

    fn vm_statistics(&self) -> Result<VmStatistics> {
        let meminfo = fs::read_to_string("/proc/meminfo")?;
        parse_meminfo(&meminfo, page_size())
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
        match fs::read_to_string("/proc/self/maps") {
            Ok(maps) => parse_mapped_images(&maps),
            Err(err) => {
                tracing::warn!(error = %err, "could not read /proc/self/maps");
                Vec::new()
            }
        }
    }

    fn is_being_traced(&self) -> bool {
        fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_tracer_pid(&status))
            .map_or(false, |pid| pid > 0)
    }
}

pub(crate) fn parse_tracer_pid(status: &str) -> Option<u32> {
    status_field(status, "TracerPid:").and_then(|raw| raw.parse::<u32>().ok())
}

fn status_field<'a>(status: &'a str, key: &str) -> Option<&'a str> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
}

fn status_u64(status: &str, key: &'static str) -> Result<u64> {
    status_field(status, key)
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or(DefenseError::Parse {
            source_name: "/proc/self/status",
            detail: format!("missing or malformed {}", key),
        })
}

pub(crate) fn parse_task_status(status: &str) -> Result<TaskSnapshot> {
    let resident_kb = status_u64(status, "VmRSS:")?;
    let virtual_kb = status_u64(status, "VmSize:")?;
    let threads = status_u64(status, "Threads:")?;
    // Switch counters are absent on some hardened kernels.
    let voluntary = status_u64(status, "voluntary_ctxt_switches:").unwrap_or(0);
    let involuntary = status_u64(status, "nonvoluntary_ctxt_switches:").unwrap_or(0);

    Ok(TaskSnapshot {
        resident_size: resident_kb * 1024,
        virtual_size: virtual_kb * 1024,
        thread_count: threads as u32,
        context_switches: voluntary + involuntary,
        suspend_count: 0,
    })
}

pub(crate) fn parse_meminfo(meminfo: &str, page_size: u64) -> Result<VmStatistics> {
    let field = |key: &'static str| -> Result<u64> {
        status_field(meminfo, key)
            .and_then(|raw| raw.parse::<u64>().ok())
            .ok_or(DefenseError::Parse {
                source_name: "/proc/meminfo",
                detail: format!("missing or malformed {}", key),
            })
    };
    let page_size = page_size.max(1);
    let free_kb = field("MemFree:")?;
    let inactive_kb = field("Inactive:")?;

    Ok(VmStatistics {
        free_pages: free_kb * 1024 / page_size,
        inactive_pages: inactive_kb * 1024 / page_size,
        page_size,
    })
}

pub(crate) fn parse_mapped_images(maps: &str) -> Vec<String> {
    let images: BTreeSet<&str> = maps
        .lines()
        .filter_map(|line| line.split_whitespace().nth(5))
        .filter(|path| path.starts_with('/'))
        .collect();
    images.into_iter().map(str::to_string).collect()
}
