//! Boot handoff record.
//!
//! Written once into its 64-byte slot just before the loader hands off; the
//! next stage reads it by convention from the address it is given.

use static_assertions::const_assert;

use crate::config::BOOT_INFO_ALIGN;
use crate::mm::{ArenaLayout, Region};

/// `"ABI1"` in ASCII.
pub const BOOT_INFO_MAGIC: u32 = 0x4142_4931;

/// Fixed-layout record for the next stage. All addresses are physical,
/// which at handoff time equals virtual for every mapped region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootInfo {
    pub magic: u32,
    /// First-level translation table in use.
    pub pt_root: u32,
    /// Arena reserved for further page tables.
    pub pt_arena: u32,
    pub pt_arena_len: u32,
    /// Relocated device tree.
    pub fdt: u32,
    pub free: u32,
    pub free_len: u32,
    /// The loader's own identity-mapped image.
    pub image: u32,
    pub image_len: u32,
    pub console: u32,
    pub console_len: u32,
    pub archive: u32,
    pub archive_len: u32,
}

const_assert!(core::mem::size_of::<BootInfo>() as u64 <= BOOT_INFO_ALIGN);
const_assert!(core::mem::align_of::<BootInfo>() == 4);

/// Narrow a region that the layout already bounded below 4 GiB.
fn narrow(region: Region) -> (u32, u32) {
    (
        region.base.as_u64() as u32,
        region.len.min(u32::MAX as u64) as u32,
    )
}

impl BootInfo {
    pub fn new(layout: &ArenaLayout, image: Region, console: Region, archive: Region) -> Self {
        let (pt_root, _) = narrow(layout.table_root);
        let (pt_arena, pt_arena_len) = narrow(layout.table_arena);
        let (fdt, _) = narrow(layout.fdt);
        let (free, free_len) = narrow(layout.free);
        let (image, image_len) = narrow(image);
        let (console, console_len) = narrow(console);
        let (archive, archive_len) = narrow(archive);
        Self {
            magic: BOOT_INFO_MAGIC,
            pt_root,
            pt_arena,
            pt_arena_len,
            fdt,
            free,
            free_len,
            image,
            image_len,
            console,
            console_len,
            archive,
            archive_len,
        }
    }

    /// Store the record at `addr`.
    ///
    /// # Safety
    /// `addr` must be writable, 4-byte aligned and hold `size_of::<Self>()`
    /// bytes that nothing else uses.
    pub unsafe fn write_to(&self, addr: usize) {
        // SAFETY: Guaranteed by the caller.
        unsafe { core::ptr::write_volatile(addr as *mut Self, *self) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::{plan::MemoryPlan, ArenaLayout};

    #[test]
    fn test_from_layout() {
        let plan = MemoryPlan {
            archive: Region::new(0x4100_0000, 0x1000),
            memory: Region::new(0x4000_0000, 0x1000_0000),
        };
        let layout = ArenaLayout::build(&plan, 0x2000, Region::new(0x4001_0000, 0x8000), [])
            .unwrap();
        let console = Region::new(0x0900_0000, 0x10_0000);
        let info = BootInfo::new(&layout, Region::new(0x4001_0000, 0x8000), console, plan.archive);

        assert_eq!(info.magic, BOOT_INFO_MAGIC);
        assert_eq!(info.pt_root, 0x4110_0000);
        assert_eq!(info.pt_arena, 0x4110_4000);
        assert_eq!(info.pt_arena_len, 0x40_0000);
        assert_eq!(info.fdt, 0x4150_4000);
        assert_eq!(info.free, 0x4160_0000);
        assert_eq!(info.free_len, 0x0ea0_0000);
        assert_eq!((info.image, info.image_len), (0x4001_0000, 0x8000));
        assert_eq!((info.console, info.console_len), (0x0900_0000, 0x10_0000));
        assert_eq!((info.archive, info.archive_len), (0x4100_0000, 0x1000));
    }

    #[test]
    fn test_write_to() {
        let mut slot = [0u32; 16];
        let info = BootInfo {
            magic: BOOT_INFO_MAGIC,
            pt_root: 1,
            pt_arena: 2,
            pt_arena_len: 3,
            fdt: 4,
            free: 5,
            free_len: 6,
            image: 7,
            image_len: 8,
            console: 9,
            console_len: 10,
            archive: 11,
            archive_len: 12,
        };
        unsafe { info.write_to(slot.as_mut_ptr() as usize) };
        assert_eq!(slot[..13], [BOOT_INFO_MAGIC, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(slot[13..], [0, 0, 0]);
    }
}
