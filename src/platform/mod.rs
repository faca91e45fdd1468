//! Platform seams: the OS queries the detectors and countermeasures consume.
//!
//! Everything that touches a specific kernel's API sits behind
//! [`SystemInspector`] or [`IntegrityProbe`] so that calibration, fusion and
//! the countermeasure math can run against fakes in tests.

pub mod clock;

#[cfg(target_vendor = "apple")]
mod apple;
#[cfg(target_vendor = "apple")]
pub use apple::{HostInspector, SystemIntegrityProbe};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::{HostInspector, SystemIntegrityProbe};

#[cfg(not(any(target_vendor = "apple", target_os = "linux")))]
mod unsupported;
#[cfg(not(any(target_vendor = "apple", target_os = "linux")))]
pub use unsupported::{HostInspector, SystemIntegrityProbe};

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

/// Conversion factor from absolute-time ticks to nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    pub numer: u32,
    pub denom: u32,
}

impl Timebase {
    pub const NANOS: Timebase = Timebase { numer: 1, denom: 1 };

    pub fn to_nanos(&self, ticks: u64) -> u64 {
        if self.denom == 0 {
            return ticks;
        }
        (ticks as u128 * self.numer as u128 / self.denom as u128) as u64
    }
}

/// Task-level counters read from OS introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub resident_size: u64,
    pub virtual_size: u64,
    pub thread_count: u32,
    pub context_switches: u64,
    pub suspend_count: u64,
}

/// Physical memory page counts from the VM statistics API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStatistics {
    pub free_pages: u64,
    pub inactive_pages: u64,
    pub page_size: u64,
}

impl VmStatistics {
    /// Free plus inactive pages, in bytes.
    pub fn available_bytes(&self) -> u64 {
        self.free_pages
            .saturating_add(self.inactive_pages)
            .saturating_mul(self.page_size)
    }
}

/// Process and VM introspection used by telemetry and the RAM filler.
pub trait SystemInspector: Send + Sync {
    fn timebase(&self) -> Result<Timebase>;

    /// Monotonic absolute time in timebase ticks.
    fn absolute_time(&self) -> u64;

    fn task_snapshot(&self) -> Result<TaskSnapshot>;

    fn vm_statistics(&self) -> Result<VmStatistics>;
}

/// Platform integrity queries used by the jailbreak and debugger detectors.
pub trait IntegrityProbe: Send + Sync {
    fn path_exists(&self, path: &str) -> bool;

    /// True if the current process can create a file inside `dir`.
    fn is_path_writable(&self, dir: &str) -> bool;

    /// Paths or names of every dynamic library mapped into the process.
    fn loaded_images(&self) -> Vec<String>;

    /// The kernel's "currently traced" flag for this process.
    fn is_being_traced(&self) -> bool;
}

/// Known artifacts of tamper frameworks on the target platform.
#[derive(Debug, Clone)]
pub struct JailbreakIndicators {
    pub tamper_paths: Vec<String>,
    /// A directory an unmodified sandbox never lets the app write into.
    pub restricted_dir: String,
    /// Substrings that mark an injected hooking library.
    pub library_markers: Vec<String>,
}

impl Default for JailbreakIndicators {
    fn default() -> Self {
        #[cfg(target_vendor = "apple")]
        let (paths, restricted): (&[&str], &str) = (
            &[
                "/Applications/Cydia.app",
                "/Applications/Sileo.app",
                "/Library/MobileSubstrate/MobileSubstrate.dylib",
                "/usr/sbin/sshd",
                "/etc/apt",
                "/private/var/lib/apt/",
                "/var/jb",
            ],
            "/private",
        );

        #[cfg(not(target_vendor = "apple"))]
        let (paths, restricted): (&[&str], &str) = (
            &[
                "/data/local/tmp/frida-server",
                "/data/local/tmp/re.frida.server",
                "/sbin/su",
                "/system/xbin/su",
                "/usr/lib/frida",
            ],
            "/system",
        );

        Self {
            tamper_paths: paths.iter().map(|p| p.to_string()).collect(),
            restricted_dir: restricted.to_string(),
            library_markers: [
                "MobileSubstrate",
                "SubstrateLoader",
                "TweakInject",
                "libhooker",
                "substitute",
                "cycript",
                "SSLKillSwitch",
                "frida",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

/// Creates and removes a uniquely named file inside `dir`.
pub(crate) fn probe_writable(dir: &str) -> bool {
    let probe = Path::new(dir).join(format!(".shield-probe-{}", std::process::id()));
    match OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(file) => {
            drop(file);
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

pub(crate) fn page_size() -> u64 {
    // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}
