//! ARMv7-A CP15 implementation of [`Cpu`].

use core::arch::asm;

use super::{CacheMaintenance, Cpu};

/// SCTLR bits touched by the loader.
mod sctlr {
    /// MMU enable.
    pub const M: u32 = 1 << 0;
    /// Alignment fault checking.
    pub const A: u32 = 1 << 1;
    /// Data and unified caches.
    pub const C: u32 = 1 << 2;
    /// Branch prediction.
    pub const Z: u32 = 1 << 11;
    /// Instruction cache.
    pub const I: u32 = 1 << 12;

    pub const CACHES: u32 = C | Z | I;
}

/// Domain 0 as client: accesses are checked against the descriptor AP bits.
const DACR_DOMAIN0_CLIENT: u32 = 0b01;

/// The processor the loader is running on.
///
/// Only one instance should exist; every method touches system registers
/// of the executing core.
pub struct Armv7 {
    _private: (),
}

impl Armv7 {
    /// # Safety
    /// Must run in a privileged mode, and the caller must be the only code
    /// driving the CP15 controls for the lifetime of the returned value.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn read_sctlr(&self) -> u32 {
        let value: u32;
        // SAFETY: Reading SCTLR has no side effects.
        unsafe {
            asm!(
                "mrc p15, 0, {}, c1, c0, 0",
                out(reg) value,
                options(nomem, nostack, preserves_flags),
            );
        }
        value
    }

    fn write_sctlr(&mut self, value: u32) {
        // SAFETY: `Armv7::new` made the caller the only SCTLR writer; the
        // callers below only change bits the boot sequence owns.
        unsafe {
            asm!(
                "mcr p15, 0, {}, c1, c0, 0",
                "isb",
                in(reg) value,
                options(nostack, preserves_flags),
            );
        }
    }
}

impl CacheMaintenance for Armv7 {
    fn clidr(&mut self) -> u32 {
        let value: u32;
        // SAFETY: Read-only identification register.
        unsafe {
            asm!(
                "mrc p15, 1, {}, c0, c0, 1",
                out(reg) value,
                options(nomem, nostack, preserves_flags),
            );
        }
        value
    }

    fn ccsidr(&mut self, level: u32) -> u32 {
        let value: u32;
        // SAFETY: CSSELR only selects which CCSIDR is visible; the isb makes
        // the selection take effect before the read.
        unsafe {
            asm!(
                "mcr p15, 2, {sel}, c0, c0, 0",
                "isb",
                "mrc p15, 1, {val}, c0, c0, 0",
                sel = in(reg) level << 1,
                val = lateout(reg) value,
                options(nostack, preserves_flags),
            );
        }
        value
    }

    fn clean_invalidate_set_way(&mut self, setway: u32) {
        // SAFETY: DCCISW writes back and drops one line; memory stays coherent.
        unsafe {
            asm!(
                "mcr p15, 0, {}, c7, c14, 2",
                in(reg) setway,
                options(nostack, preserves_flags),
            );
        }
    }

    fn sync(&mut self) {
        // SAFETY: Barriers only.
        unsafe {
            asm!("dsb", "isb", options(nostack, preserves_flags));
        }
    }
}

impl Cpu for Armv7 {
    fn enable_unaligned_access(&mut self) {
        let value = self.read_sctlr() & !sctlr::A;
        self.write_sctlr(value);
    }

    fn disable_caches(&mut self) {
        let value = self.read_sctlr() & !sctlr::CACHES;
        self.write_sctlr(value);
    }

    fn invalidate_icache(&mut self) {
        // SAFETY: ICIALLU and BPIALL only discard instruction-side state.
        unsafe {
            asm!(
                "mcr p15, 0, {zero}, c7, c5, 0",
                "mcr p15, 0, {zero}, c7, c5, 6",
                "dsb",
                "isb",
                zero = in(reg) 0u32,
                options(nostack, preserves_flags),
            );
        }
    }

    fn install_table(&mut self, root: u32) {
        // SAFETY: TTBCR.N = 0 sends every address through TTBR0; the table
        // at `root` is fully written and all stale TLB entries are dropped
        // before the MMU can use it.
        unsafe {
            asm!(
                "mcr p15, 0, {zero}, c2, c0, 2",
                "mcr p15, 0, {root}, c2, c0, 0",
                "mcr p15, 0, {dacr}, c3, c0, 0",
                "mcr p15, 0, {zero}, c8, c7, 0",
                "dsb",
                "isb",
                zero = in(reg) 0u32,
                root = in(reg) root,
                dacr = in(reg) DACR_DOMAIN0_CLIENT,
                options(nostack, preserves_flags),
            );
        }
    }

    fn enable_mmu(&mut self) {
        let value = self.read_sctlr() | sctlr::M;
        self.write_sctlr(value);
    }

    fn mmu_enabled(&self) -> bool {
        self.read_sctlr() & sctlr::M != 0
    }

    fn enable_caches(&mut self) {
        let value = self.read_sctlr() | sctlr::CACHES;
        self.write_sctlr(value);
    }
}
