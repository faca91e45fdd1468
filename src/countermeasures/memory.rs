//! Secure wiping, RAM pressure, and decoy pattern generation.
//!
//! Every write that must survive optimization goes through
//! `ptr::write_volatile` or `zeroize`, never a plain store.

use std::ptr;

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use zeroize::Zeroize;

use crate::error::{DefenseError, Result};
use crate::platform::{clock, HostInspector, SystemInspector};

pub const RAM_CHUNK_SIZE: usize = 1 << 20;
pub const PAGE_TOUCH_STRIDE: usize = 4096;
pub const DECOY_BLOCK_SIZE: usize = 256;

/// Allocates `len` zeroed bytes, reporting failure instead of aborting.
pub(crate) fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| DefenseError::Allocation { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Writes `pattern` over every byte of `buf` through volatile stores.
pub fn overwrite_with_pattern(buf: &mut [u8], pattern: u8) {
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference.
        unsafe { ptr::write_volatile(byte, pattern) };
    }
}

/// Overwrites `buf` with secure random bytes through volatile stores.
fn overwrite_with_random(buf: &mut [u8]) -> Result<()> {
    let mut block = [0u8; 4096];
    for chunk in buf.chunks_mut(block.len()) {
        let source = &mut block[..chunk.len()];
        OsRng.try_fill_bytes(source)?;
        for (dst, &src) in chunk.iter_mut().zip(source.iter()) {
            // SAFETY: `dst` is a valid, exclusive reference.
            unsafe { ptr::write_volatile(dst, src) };
        }
    }
    block.zeroize();
    Ok(())
}

/// Four full passes: 0x00, 0xFF, random, 0x00.
///
/// If the random source fails the third pass is replaced by a 0xAA pass so
/// the buffer still ends zeroed.
pub fn secure_wipe(buf: &mut [u8]) {
    if buf.is_empty() {
        return;
    }
    buf.zeroize();
    overwrite_with_pattern(buf, 0xFF);
    if let Err(err) = overwrite_with_random(buf) {
        tracing::warn!(error = %err, "random wipe pass failed, using fixed pattern");
        overwrite_with_pattern(buf, 0xAA);
    }
    buf.zeroize();
    clock::memory_barrier();
}

/// [`secure_wipe`] for memory owned outside Rust. Null or empty is a no-op.
///
/// # Safety
///
/// `addr` must be null or valid for writes of `size` bytes, with no other
/// live references into that range.
pub unsafe fn secure_wipe_raw(addr: *mut u8, size: usize) {
    if addr.is_null() || size == 0 {
        return;
    }
    secure_wipe(std::slice::from_raw_parts_mut(addr, size));
}

/// One pass of secure random bytes, then a barrier.
pub fn scramble_memory(buf: &mut [u8]) -> Result<()> {
    overwrite_with_random(buf)?;
    clock::memory_barrier();
    Ok(())
}

/// Outcome of one RAM-pressure run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RamFillReport {
    pub available_bytes: u64,
    pub target_bytes: u64,
    pub allocated_bytes: u64,
    pub chunks: usize,
    pub stopped_early: bool,
}

/// Fills `fill_percent` of currently available RAM with random data, then
/// releases it. Evicts stale secrets from free pages and buries the process
/// image in noise.
pub fn fill_available_ram(fill_percent: u32) -> RamFillReport {
    fill_ram_with(&HostInspector, fill_percent)
}

/// [`fill_available_ram`] against an explicit inspector.
pub fn fill_ram_with(inspector: &dyn SystemInspector, fill_percent: u32) -> RamFillReport {
    let fill_percent = fill_percent.min(100) as u64;
    let mut report = RamFillReport::default();
    if fill_percent == 0 {
        return report;
    }

    let vm = match inspector.vm_statistics() {
        Ok(vm) => vm,
        Err(err) => {
            tracing::warn!(error = %err, "VM statistics unavailable, skipping RAM fill");
            report.stopped_early = true;
            return report;
        }
    };
    report.available_bytes = vm.available_bytes();
    report.target_bytes = (report.available_bytes as u128 * fill_percent as u128 / 100) as u64;

    let mut chunks: Vec<Vec<u8>> = Vec::new();
    while report.allocated_bytes < report.target_bytes {
        let remaining = report.target_bytes - report.allocated_bytes;
        let len = remaining.min(RAM_CHUNK_SIZE as u64) as usize;

        if chunks.try_reserve(1).is_err() {
            report.stopped_early = true;
            break;
        }
        let mut chunk = match try_alloc_zeroed(len) {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!(error = %err, allocated = report.allocated_bytes, "RAM fill stopped");
                report.stopped_early = true;
                break;
            }
        };
        if let Err(err) = OsRng.try_fill_bytes(&mut chunk) {
            tracing::warn!(error = %err, "secure random source failed, RAM fill stopped");
            report.stopped_early = true;
            break;
        }
        touch_pages(&mut chunk);

        report.allocated_bytes += len as u64;
        chunks.push(chunk);
    }
    report.chunks = chunks.len();

    for chunk in chunks.iter_mut() {
        if let Some(first) = chunk.first_mut() {
            let first: *mut u8 = first;
            // SAFETY: derived from a live, exclusive reference.
            unsafe { ptr::write_volatile(first, ptr::read_volatile(first)) };
        }
    }
    tracing::debug!(
        target_bytes = report.target_bytes,
        allocated_bytes = report.allocated_bytes,
        chunks = report.chunks,
        "RAM fill complete"
    );
    report
}

/// Writes one byte per page so the kernel has to back every page.
fn touch_pages(buf: &mut [u8]) {
    for offset in (0..buf.len()).step_by(PAGE_TOUCH_STRIDE) {
        // SAFETY: `offset < buf.len()`.
        unsafe {
            let byte = buf.as_mut_ptr().add(offset);
            ptr::write_volatile(byte, ptr::read_volatile(byte));
        }
    }
}

/// Lays decoy content over `buf` in 256-byte blocks:
///
/// | offset in block | content                         | mimics          |
/// |-----------------|---------------------------------|-----------------|
/// | `0..32`         | secure random bytes             | key material    |
/// | `32..128`       | printable ASCII `0x20..=0x7E`   | text            |
/// | `128..256`      | `global_offset ^ 0xAA`          | structured data |
///
/// A trailing partial block is filled with the same layout, truncated.
pub fn write_decoy_patterns(buf: &mut [u8]) -> Result<()> {
    let mut rng = rand::thread_rng();
    for (block_index, block) in buf.chunks_mut(DECOY_BLOCK_SIZE).enumerate() {
        let base = block_index * DECOY_BLOCK_SIZE;
        let key_end = block.len().min(32);
        OsRng.try_fill_bytes(&mut block[..key_end])?;

        for (j, byte) in block.iter_mut().enumerate().skip(32) {
            let value = if j < 128 {
                rng.gen_range(0x20u8..=0x7E)
            } else {
                ((base + j) ^ 0xAA) as u8
            };
            // SAFETY: `byte` is a valid, exclusive reference.
            unsafe { ptr::write_volatile(byte, value) };
        }
    }
    Ok(())
}

/// Materializes `size_mb` MiB of decoy patterns, touches every page, then
/// releases the region. Returns the bytes written, 0 on failure.
pub fn create_decoy_patterns(size_mb: usize) -> usize {
    let len = size_mb.saturating_mul(RAM_CHUNK_SIZE);
    let mut decoys = match try_alloc_zeroed(len) {
        Ok(buf) => buf,
        Err(err) => {
            tracing::warn!(error = %err, size_mb, "decoy allocation failed");
            return 0;
        }
    };
    if let Err(err) = write_decoy_patterns(&mut decoys) {
        tracing::warn!(error = %err, "decoy generation failed");
        return 0;
    }
    touch_pages(&mut decoys);
    std::hint::black_box(&decoys);
    len
}
