//! Cache-line flush, prefetch, and cache poisoning.

use rand::rngs::OsRng;
use rand::RngCore;

use super::memory::try_alloc_zeroed;
use crate::ffi;
use crate::platform::clock;

pub const CACHE_LINE_SIZE: usize = 64;

/// Last-level cache budget assumed by `poison_cache`, in KiB.
pub const LLC_BUDGET_KB: usize = 8192;

/// Evicts every cache line overlapping `buf`, then issues a full barrier.
pub fn flush_cache_range(buf: &[u8]) {
    for_each_line(buf, |line| {
        // SAFETY: `line` lies inside the line-aligned span of a live borrow.
        unsafe { ffi::flush_cache_line(line) }
    });
    clock::memory_barrier();
}

/// Prefetches every cache line overlapping `buf`, then issues a full barrier.
pub fn prefetch_cache_range(buf: &[u8]) {
    for_each_line(buf, |line| {
        // SAFETY: prefetch is a hint and never faults.
        unsafe { ffi::prefetch_cache_line(line) }
    });
    clock::memory_barrier();
}

/// Walks from the line containing the start of `buf` to its original end.
fn for_each_line(buf: &[u8], mut op: impl FnMut(*const u8)) {
    if buf.is_empty() {
        return;
    }
    let start = buf.as_ptr() as usize;
    let end = start + buf.len();
    let mut line = start & !(CACHE_LINE_SIZE - 1);
    while line < end {
        op(line as *const u8);
        line += CACHE_LINE_SIZE;
    }
}

/// Reads one byte from every cache line and returns their wrapping sum.
/// Volatile reads keep the sweep from being optimized out.
pub fn read_sweep(buf: &[u8]) -> u64 {
    let mut sum = 0u64;
    for offset in (0..buf.len()).step_by(CACHE_LINE_SIZE) {
        // SAFETY: `offset < buf.len()`.
        let byte = unsafe { std::ptr::read_volatile(buf.as_ptr().add(offset)) };
        sum = sum.wrapping_add(byte as u64);
    }
    std::hint::black_box(sum)
}

/// Pulls `size_kb` KiB of random bytes through the cache.
///
/// Returns false if allocation or the random source failed; the buffer is
/// released on every path.
pub fn fill_cache_with_noise(size_kb: usize) -> bool {
    let bytes = size_kb.saturating_mul(1024);
    let mut noise = match try_alloc_zeroed(bytes) {
        Ok(buf) => buf,
        Err(err) => {
            tracing::warn!(error = %err, size_kb, "cache noise allocation failed");
            return false;
        }
    };
    if let Err(err) = OsRng.try_fill_bytes(&mut noise) {
        tracing::warn!(error = %err, "secure random source failed, skipping cache noise");
        return false;
    }
    read_sweep(&noise);
    prefetch_cache_range(&noise);
    true
}

/// KiB of noise `poison_cache` requests for a given intensity.
pub fn poison_budget_kb(intensity_percent: u32) -> usize {
    LLC_BUDGET_KB * intensity_percent.min(100) as usize / 100
}

/// Displaces up to the whole last-level cache with noise.
/// Returns the KiB requested; 0 means no fill was attempted.
pub fn poison_cache(intensity_percent: u32) -> usize {
    let size_kb = poison_budget_kb(intensity_percent);
    if size_kb > 0 {
        tracing::debug!(size_kb, "poisoning cache");
        fill_cache_with_noise(size_kb);
    }
    size_kb
}
