//! Arena layout inside the selected memory range.
//!
//! Starting at the archive end rounded up to 1 MiB, regions are bumped out
//! in a fixed order:
//!
//! | region           | size                 | alignment |
//! |------------------|----------------------|-----------|
//! | page-table root  | 16 KiB               | 16 KiB    |
//! | page-table arena | 4 MiB                | 4 KiB     |
//! | device tree copy | blob `totalsize`     | 8         |
//! | boot info        | `size_of::<BootInfo>`| 64        |
//! | free memory      | up to the range end  | 1 MiB     |
//!
//! Nothing is ever freed; each region starts where the previous one ended.

use super::address::{PhysAddr, Region};
use super::plan::MemoryPlan;
use crate::bootinfo::BootInfo;
use crate::config::{
    ADDRESSABLE_LIMIT, BOOT_INFO_ALIGN, FDT_COPY_ALIGN, SECTION_SIZE, TABLE_ARENA_ALIGN,
    TABLE_ARENA_SIZE, TABLE_ROOT_SIZE,
};

/// Failures while laying out the arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("{region} would end at {end:#x}, past the usable limit {limit:#x}")]
    ArenaOverflow {
        region: &'static str,
        end: u64,
        limit: u64,
    },
    #[error("boot scratch {scratch:?} overlaps the loader image {image:?}")]
    ImageOverlap { scratch: Region, image: Region },
    #[error("boot scratch {scratch:?} overlaps reserved memory {reserved:?}")]
    ReservedOverlap { scratch: Region, reserved: Region },
}

/// Where everything the loader builds lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLayout {
    pub table_root: Region,
    pub table_arena: Region,
    pub fdt: Region,
    pub boot_info: Region,
    pub free: Region,
}

/// Bump cursor over `[cursor, limit)`.
struct Bump {
    cursor: PhysAddr,
    limit: PhysAddr,
}

impl Bump {
    fn overflow(&self, region: &'static str, end: u64) -> LayoutError {
        LayoutError::ArenaOverflow {
            region,
            end,
            limit: self.limit.as_u64(),
        }
    }

    fn take(&mut self, region: &'static str, align: u64, len: u64) -> Result<Region, LayoutError> {
        let start = self
            .cursor
            .align_up(align)
            .ok_or_else(|| self.overflow(region, u64::MAX))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| self.overflow(region, u64::MAX))?;
        if end > self.limit {
            return Err(self.overflow(region, end.as_u64()));
        }
        self.cursor = end;
        Ok(Region { base: start, len })
    }
}

impl ArenaLayout {
    /// Lay out the arenas for `plan`.
    ///
    /// `fdt_size` is the blob's declared total size. The span from the
    /// table root to the end of the boot info must not touch the loader
    /// `image` or any firmware `reserved` range.
    pub fn build<I>(
        plan: &MemoryPlan,
        fdt_size: u32,
        image: Region,
        reserved: I,
    ) -> Result<Self, LayoutError>
    where
        I: IntoIterator<Item = Region>,
    {
        let limit = plan.memory.end().min(PhysAddr::new(ADDRESSABLE_LIMIT));
        let start = plan
            .archive
            .end()
            .align_up(SECTION_SIZE)
            .ok_or(LayoutError::ArenaOverflow {
                region: "page-table root",
                end: u64::MAX,
                limit: limit.as_u64(),
            })?;
        let mut bump = Bump {
            cursor: start,
            limit,
        };

        let table_root = bump.take("page-table root", TABLE_ROOT_SIZE, TABLE_ROOT_SIZE)?;
        let table_arena = bump.take("page-table arena", TABLE_ARENA_ALIGN, TABLE_ARENA_SIZE)?;
        let fdt = bump.take("device tree copy", FDT_COPY_ALIGN, fdt_size as u64)?;
        let boot_info = bump.take(
            "boot info",
            BOOT_INFO_ALIGN,
            core::mem::size_of::<BootInfo>() as u64,
        )?;

        let free_start = boot_info
            .end()
            .align_up(SECTION_SIZE)
            .ok_or_else(|| bump.overflow("free memory", u64::MAX))?;
        let free_end = limit.align_down(SECTION_SIZE);
        let free = Region::from_bounds(free_start, free_end)
            .ok_or_else(|| bump.overflow("free memory", free_start.as_u64()))?;

        let layout = Self {
            table_root,
            table_arena,
            fdt,
            boot_info,
            free,
        };

        let scratch = layout.scratch();
        if scratch.overlaps(&image) {
            return Err(LayoutError::ImageOverlap { scratch, image });
        }
        if let Some(reserved) = reserved.into_iter().find(|r| scratch.overlaps(r)) {
            return Err(LayoutError::ReservedOverlap { scratch, reserved });
        }
        Ok(layout)
    }

    /// Everything the loader writes: table root through boot info.
    pub fn scratch(&self) -> Region {
        Region {
            base: self.table_root.base,
            len: self.boot_info.end().as_u64() - self.table_root.base.as_u64(),
        }
    }

    /// The regions in address order, with their names.
    pub fn regions(&self) -> [(&'static str, Region); 5] {
        [
            ("page-table root", self.table_root),
            ("page-table arena", self.table_arena),
            ("device tree copy", self.fdt),
            ("boot info", self.boot_info),
            ("free memory", self.free),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(archive: Region, memory: Region) -> MemoryPlan {
        MemoryPlan { archive, memory }
    }

    const NO_IMAGE: Region = Region::new(0, 0);
    const BOOT_INFO_LEN: u64 = core::mem::size_of::<BootInfo>() as u64;

    #[test]
    fn test_reference_layout() {
        let p = plan(Region::new(0x4100_0000, 0x0012_3456), Region::new(0x4000_0000, 0x1000_0000));
        let l = ArenaLayout::build(&p, 0x1234, NO_IMAGE, []).unwrap();
        assert_eq!(l.table_root, Region::new(0x4120_0000, 0x4000));
        assert_eq!(l.table_arena, Region::new(0x4120_4000, 0x40_0000));
        assert_eq!(l.fdt, Region::new(0x4160_4000, 0x1234));
        assert_eq!(l.boot_info.base.as_u64(), 0x4160_5240);
        assert_eq!(l.free, Region::new(0x4170_0000, 0x5000_0000 - 0x4170_0000));
        assert_eq!(l.scratch().base, l.table_root.base);
        assert_eq!(l.scratch().end(), l.boot_info.end());
    }

    #[test]
    fn test_regions_monotonic_and_inside_memory() {
        let memory = Region::new(0x4000_0000, 0x4000_0000);
        let archive_ends = [0x4000_0001u64, 0x4012_3457, 0x4100_0000, 0x47ff_ffff];
        let fdt_sizes = [40u32, 0x1000, 0x1235, 0x10_0001];
        for end in archive_ends {
            for size in fdt_sizes {
                let archive = Region::new(0x4000_0000, end - 0x4000_0000);
                let l = ArenaLayout::build(&plan(archive, memory), size, NO_IMAGE, []).unwrap();
                let regions = l.regions();
                assert!(regions[0].1.base >= archive.end());
                for pair in regions.windows(2) {
                    assert!(pair[0].1.end() <= pair[1].1.base, "{:?}", pair);
                }
                for (name, region) in regions {
                    assert!(memory.encloses(&region), "{name} {:?}", region);
                }
                assert!(l.table_root.base.is_aligned(TABLE_ROOT_SIZE));
                assert!(l.fdt.base.is_aligned(FDT_COPY_ALIGN));
                assert!(l.boot_info.base.is_aligned(BOOT_INFO_ALIGN));
                assert!(l.free.base.is_aligned(SECTION_SIZE));
                assert!(l.free.end().is_aligned(SECTION_SIZE));
            }
        }
    }

    #[test]
    fn test_arena_overflow() {
        // Room for the root, not for the 4 MiB arena.
        let p = plan(Region::new(0x1000, 0x1000), Region::new(0, 0x30_0000));
        assert_eq!(
            ArenaLayout::build(&p, 0x1000, NO_IMAGE, []),
            Err(LayoutError::ArenaOverflow {
                region: "page-table arena",
                end: 0x50_4000,
                limit: 0x30_0000
            })
        );

        // A blob claiming 4 GiB cannot be copied.
        let p = plan(Region::new(0x1000, 0x1000), Region::new(0, 0x1000_0000));
        assert!(matches!(
            ArenaLayout::build(&p, u32::MAX, NO_IMAGE, []),
            Err(LayoutError::ArenaOverflow {
                region: "device tree copy",
                ..
            })
        ));
    }

    #[test]
    fn test_free_memory_must_not_be_negative() {
        // Boot info ends just past the last whole section.
        let p = plan(Region::new(0x1000, 0x1000), Region::new(0, 0x0050_8000));
        assert!(matches!(
            ArenaLayout::build(&p, 0x1000, NO_IMAGE, []),
            Err(LayoutError::ArenaOverflow {
                region: "free memory",
                ..
            })
        ));
    }

    #[test]
    fn test_memory_above_4gib_is_clamped() {
        let p = plan(Region::new(0xf000_0000, 0x1000), Region::new(0xc000_0000, 0x1_0000_0000));
        let l = ArenaLayout::build(&p, 0x1000, NO_IMAGE, []).unwrap();
        assert_eq!(l.free.end().as_u64(), ADDRESSABLE_LIMIT);
    }

    #[test]
    fn test_image_overlap() {
        let p = plan(Region::new(0x1000, 0x1000), Region::new(0, 0x1000_0000));
        let image = Region::new(0x10_2000, 0x1000);
        assert!(matches!(
            ArenaLayout::build(&p, 0x1000, image, []),
            Err(LayoutError::ImageOverlap { .. })
        ));
        // Adjacent is fine.
        let image = Region::new(0x0, 0x10_0000);
        assert!(ArenaLayout::build(&p, 0x1000, image, []).is_ok());
    }

    #[test]
    fn test_reserved_overlap() {
        let p = plan(Region::new(0x1000, 0x1000), Region::new(0, 0x1000_0000));
        let reserved = [Region::new(0x8000, 0x1000), Region::new(0x30_0000, 0x10)];
        assert_eq!(
            ArenaLayout::build(&p, 0x1000, NO_IMAGE, reserved),
            Err(LayoutError::ReservedOverlap {
                scratch: Region::new(0x10_0000, 0x40_5000 + BOOT_INFO_LEN),
                reserved: reserved[1]
            })
        );
    }
}
