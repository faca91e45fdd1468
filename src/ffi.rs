//! Low-level primitives implemented in `asm/` and linked by `build.rs`.

extern "C" {
    /// Returns the hardware cycle counter.
    /// Serialized with LFENCE on x86_64 and ISB on AArch64.
    pub fn read_cycle_counter() -> u64;

    /// Returns the counter frequency in Hz, or 0 when the architecture
    /// does not expose it (x86_64 TSC).
    pub fn read_cycle_frequency() -> u64;

    /// Evicts the cache line containing `addr` from every cache level.
    pub fn flush_cache_line(addr: *const u8);

    /// Hints the CPU to pull the cache line containing `addr` into L1.
    pub fn prefetch_cache_line(addr: *const u8);

    /// Full load/store barrier (MFENCE / DSB SY).
    pub fn full_memory_barrier();
}

#[cfg(target_vendor = "apple")]
extern "C" {
    /// Number of images currently loaded by dyld.
    pub fn _dyld_image_count() -> u32;

    /// Path of the image at `index`, or null if the index is out of range.
    pub fn _dyld_get_image_name(index: u32) -> *const libc::c_char;
}
