//! Darwin backend: Mach task/host statistics, sysctl and dyld.
#![allow(deprecated)] // libc points Mach bindings at the mach2 crate

use std::ffi::CStr;

use super::{page_size, probe_writable, IntegrityProbe, SystemInspector, TaskSnapshot, Timebase, VmStatistics};
use crate::error::{DefenseError, Result};
use crate::ffi;

#[derive(Debug, Default, Clone, Copy)]
pub struct HostInspector;

impl SystemInspector for HostInspector {
    fn timebase(&self) -> Result<Timebase> {
        let mut info = libc::mach_timebase_info { numer: 0, denom: 0 };
        // SAFETY: `info` is a valid out-pointer for the duration of the call.
        let kr = unsafe { libc::mach_timebase_info(&mut info) };
        if kr != libc::KERN_SUCCESS || info.denom == 0 {
            return Err(DefenseError::OsQuery {
                call: "mach_timebase_info",
                code: kr,
            });
        }
        Ok(Timebase {
            numer: info.numer,
            denom: info.denom,
        })
    }

    fn absolute_time(&self) -> u64 {
        // SAFETY: no preconditions.
        unsafe { libc::mach_absolute_time() }
    }

    fn task_snapshot(&self) -> Result<TaskSnapshot> {
        let mut basic: libc::mach_task_basic_info = unsafe { std::mem::zeroed() };
        let mut count = libc::MACH_TASK_BASIC_INFO_COUNT;
        // SAFETY: `basic` is large enough for MACH_TASK_BASIC_INFO_COUNT words.
        let kr = unsafe {
            libc::task_info(
                libc::mach_task_self(),
                libc::MACH_TASK_BASIC_INFO,
                &mut basic as *mut _ as libc::task_info_t,
                &mut count,
            )
        };
        if kr != libc::KERN_SUCCESS {
            return Err(DefenseError::OsQuery {
                call: "task_info",
                code: kr,
            });
        }

        let mut task: libc::proc_taskinfo = unsafe { std::mem::zeroed() };
        let size = std::mem::size_of::<libc::proc_taskinfo>() as libc::c_int;
        // SAFETY: the buffer is exactly sizeof(proc_taskinfo) bytes.
        let written = unsafe {
            libc::proc_pidinfo(
                libc::getpid(),
                libc::PROC_PIDTASKINFO,
                0,
                &mut task as *mut _ as *mut libc::c_void,
                size,
            )
        };
        if written != size {
            return Err(DefenseError::OsQuery {
                call: "proc_pidinfo",
                code: written,
            });
        }

        Ok(TaskSnapshot {
            resident_size: basic.resident_size,
            virtual_size: basic.virtual_size,
            thread_count: task.pti_threadnum.max(0) as u32,
            context_switches: task.pti_csw.max(0) as u64,
            suspend_count: basic.suspend_count.max(0) as u64,
        })
    }

    fn vm_statistics(&self) -> Result<VmStatistics> {
        let mut stats: libc::vm_statistics64 = unsafe { std::mem::zeroed() };
        let mut count = libc::HOST_VM_INFO64_COUNT;
        // SAFETY: `stats` holds HOST_VM_INFO64_COUNT integers.
        let kr = unsafe {
            libc::host_statistics64(
                libc::mach_host_self(),
                libc::HOST_VM_INFO64,
                &mut stats as *mut _ as libc::host_info64_t,
                &mut count,
            )
        };
        if kr != libc::KERN_SUCCESS {
            return Err(DefenseError::OsQuery {
                call: "host_statistics64",
                code: kr,
            });
        }
        Ok(VmStatistics {
            free_pages: stats.free_count as u64,
            inactive_pages: stats.inactive_count as u64,
            page_size: page_size(),
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
        // SAFETY: dyld calls are thread-safe; names stay valid while the image is loaded.
        let count = unsafe { ffi::_dyld_image_count() };
        (0..count)
            .filter_map(|index| {
                let name = unsafe { ffi::_dyld_get_image_name(index) };
                if name.is_null() {
                    return None;
                }
                Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
            })
            .collect()
    }

    fn is_being_traced(&self) -> bool {
        // Raw kinfo_proc bytes; libc no longer exports the struct for Darwin.
        const KINFO_PROC_SIZE: usize = 648;
        const P_FLAG_OFFSET: usize = 32;
        const P_TRACED: i32 = 0x0000_0800;

        let mut mib: [libc::c_int; 4] = [
            libc::CTL_KERN,
            libc::KERN_PROC,
            libc::KERN_PROC_PID,
            unsafe { libc::getpid() },
        ];
        let mut buf = [0u8; KINFO_PROC_SIZE];
        let mut size = KINFO_PROC_SIZE;

        // SAFETY: `buf` is `size` bytes long and the mib array has 4 entries.
        let rc = unsafe {
            libc::sysctl(
                mib.as_mut_ptr(),
                4,
                buf.as_mut_ptr() as *mut libc::c_void,
                &mut size,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 || size < P_FLAG_OFFSET + 4 {
            tracing::warn!(rc, size, "sysctl(KERN_PROC_PID) failed");
            return false;
        }

        let p_flag = i32::from_ne_bytes([
            buf[P_FLAG_OFFSET],
            buf[P_FLAG_OFFSET + 1],
            buf[P_FLAG_OFFSET + 2],
            buf[P_FLAG_OFFSET + 3],
        ]);
        p_flag & P_TRACED != 0
    }
}
