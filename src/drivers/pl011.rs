//! PL011 UART console for the QEMU `virt` board.
//!
//! # Memory Map (QEMU virt)
//! - Base address: 0x0900_0000
//! - Register window: 0x1000 bytes, mapped as one 1 MiB device section
//!
//! Output only. QEMU brings the UART up enabled, so [`Backend::init`] has
//! nothing to program.

use crate::config::SECTION_SIZE;
use crate::console::Backend;
use crate::mm::{MappingError, Perm, PhysAddr, Region, SectionTable};

/// QEMU virt machine PL011 UART base address.
pub const QVIRT_UART_BASE: usize = 0x0900_0000;

/// PL011 register offsets.
mod regs {
    /// Data register.
    pub const DR: usize = 0x00;
    /// Flag register.
    pub const FR: usize = 0x18;
}

mod flags {
    /// Transmit FIFO full.
    pub const TXFF: u32 = 1 << 5;
}

/// Characters are sent as 7-bit ASCII.
const CHAR_MASK: u8 = 0x7f;

pub struct Pl011 {
    base: usize,
    initialized: bool,
}

impl Pl011 {
    /// # Safety
    /// `base` must be the register window of a PL011 that stays accessible
    /// at that address, both before and after the MMU switch.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            base,
            initialized: false,
        }
    }

    /// The 1 MiB section holding the registers.
    pub fn console_region(&self) -> Region {
        let base = PhysAddr::new(self.base as u64).align_down(SECTION_SIZE);
        Region {
            base,
            len: SECTION_SIZE,
        }
    }
}

impl Backend for Pl011 {
    fn init(&mut self) {
        self.initialized = true;
    }

    fn put_char(&mut self, c: u8) {
        if !self.initialized {
            return;
        }

        // SAFETY: `Pl011::new` guarantees the register window; both accesses
        // are to 32-bit MMIO registers inside it.
        unsafe {
            let fr = (self.base + regs::FR) as *const u32;
            let dr = (self.base + regs::DR) as *mut u32;

            while core::ptr::read_volatile(fr) & flags::TXFF != 0 {
                core::hint::spin_loop();
            }
            core::ptr::write_volatile(dr, (c & CHAR_MASK) as u32);
        }
    }

    fn map_console(&mut self, table: &mut SectionTable) -> Result<Region, MappingError> {
        let region = self.console_region();
        table.map_region(region, Perm::READ | Perm::WRITE | Perm::DEVICE)?;
        Ok(region)
    }

    fn halt(&mut self) -> ! {
        loop {
            #[cfg(target_arch = "arm")]
            // SAFETY: WFI only waits for an interrupt.
            unsafe {
                core::arch::asm!("wfi", options(nomem, nostack, preserves_flags));
            }
            #[cfg(not(target_arch = "arm"))]
            core::hint::spin_loop();
        }
    }
}
