//! Processor control used on the way to the MMU switch.
//!
//! The boot sequence drives the processor only through [`Cpu`], so the
//! ordering of cache, table and MMU operations can be checked on the host
//! with a recording implementation.

pub mod cache;

#[cfg(target_arch = "arm")]
pub mod armv7;

pub use cache::{clean_invalidate_all_data_caches, CacheGeometry, CacheType};

/// Register access needed to walk and flush the data caches.
pub trait CacheMaintenance {
    /// Read the cache level ID register.
    fn clidr(&mut self) -> u32;

    /// Select `level` (0-based, data side) and read its size ID register.
    fn ccsidr(&mut self, level: u32) -> u32;

    /// Clean and invalidate one data cache line by set/way.
    fn clean_invalidate_set_way(&mut self, setway: u32);

    /// Complete outstanding maintenance.
    fn sync(&mut self) {}
}

/// The processor controls the boot sequence relies on.
pub trait Cpu: CacheMaintenance {
    /// Allow unaligned data access; device tree cells are only 4-byte aligned.
    fn enable_unaligned_access(&mut self);

    /// Turn off the data and instruction caches and branch prediction.
    fn disable_caches(&mut self);

    /// Invalidate the instruction cache and branch predictor.
    fn invalidate_icache(&mut self);

    /// Point the table walker at the first-level table at `root`.
    fn install_table(&mut self, root: u32);

    fn enable_mmu(&mut self);

    fn mmu_enabled(&self) -> bool;

    /// Turn the data and instruction caches and branch prediction back on.
    fn enable_caches(&mut self);
}
