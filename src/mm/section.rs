//! ARMv7 First-Level Section Mappings
//!
//! Builds short-descriptor format section entries: each of the 4096
//! first-level slots maps one 1 MiB virtual section to a 1 MiB physical
//! section.
//!
//! # Section Descriptor Layout
//! - [1:0]   type, `0b10` for a section
//! - [2]     B (bufferable)
//! - [3]     C (cacheable)
//! - [4]     XN (execute never)
//! - [8:5]   domain
//! - [11:10] AP[1:0]
//! - [14:12] TEX
//! - [15]    AP[2] (read-only when set)
//! - [16]    S (shareable)
//! - [31:20] section base address
//!
//! # Safety Properties
//! - A valid slot is never overwritten; remapping is an error
//! - Attributes are derived from [`Perm`], never hand-assembled by callers

use bitflags::bitflags;

use super::address::{PhysAddr, Region, VirtAddr, L1_ENTRIES};
use crate::config::SECTION_SIZE;

bitflags! {
    /// Access requested for a section. Read access is always implied.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        /// Device memory: uncached, strongly ordered with respect to
        /// normal memory.
        const DEVICE = 1 << 3;
    }
}

/// A single first-level descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct SectionDescriptor(u32);

impl SectionDescriptor {
    const TYPE_MASK: u32 = 0b11;
    const TYPE_SECTION: u32 = 0b10;
    const B: u32 = 1 << 2;
    const C: u32 = 1 << 3;
    const XN: u32 = 1 << 4;
    const DOMAIN_SHIFT: u32 = 5;
    const DOMAIN_MASK: u32 = 0xf << Self::DOMAIN_SHIFT;
    /// AP[1:0] = 0b01: privileged access only.
    const AP_PRIV: u32 = 0b01 << 10;
    const TEX_SHIFT: u32 = 12;
    const TEX_MASK: u32 = 0b111 << Self::TEX_SHIFT;
    /// TEX = 0b001 with C and B set: outer and inner write-back,
    /// write-allocate.
    const TEX_WBWA: u32 = 0b001 << Self::TEX_SHIFT;
    const AP2: u32 = 1 << 15;
    const S: u32 = 1 << 16;
    const BASE_MASK: u32 = 0xfff0_0000;

    /// An invalid (fault) entry.
    #[inline]
    pub const fn invalid() -> Self {
        Self(0)
    }

    /// Encode a section entry for `pa` in domain 0.
    pub const fn section(pa: u32, perm: Perm) -> Self {
        let mut bits = (pa & Self::BASE_MASK) | Self::TYPE_SECTION | Self::B | Self::AP_PRIV;

        if !perm.contains(Perm::DEVICE) {
            bits |= Self::C | Self::TEX_WBWA | Self::S;
        }
        if !perm.contains(Perm::EXEC) {
            bits |= Self::XN;
        }
        if !perm.contains(Perm::WRITE) {
            bits |= Self::AP2;
        }
        Self(bits)
    }

    /// Check if the entry translates anything.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 & Self::TYPE_MASK != 0
    }

    /// Check if the entry is a section (as opposed to a table pointer).
    #[inline]
    pub const fn is_section(self) -> bool {
        self.0 & Self::TYPE_MASK == Self::TYPE_SECTION
    }

    /// Physical section base.
    #[inline]
    pub const fn base(self) -> u32 {
        self.0 & Self::BASE_MASK
    }

    #[inline]
    pub const fn domain(self) -> u32 {
        (self.0 & Self::DOMAIN_MASK) >> Self::DOMAIN_SHIFT
    }

    /// TEX field value.
    #[inline]
    pub const fn tex(self) -> u32 {
        (self.0 & Self::TEX_MASK) >> Self::TEX_SHIFT
    }

    /// Decode the permissions this entry grants.
    pub fn perm(self) -> Perm {
        let mut perm = Perm::READ;
        if self.0 & Self::AP2 == 0 {
            perm |= Perm::WRITE;
        }
        if self.0 & Self::XN == 0 {
            perm |= Perm::EXEC;
        }
        if self.0 & Self::C == 0 {
            perm |= Perm::DEVICE;
        }
        perm
    }

    /// Get the raw descriptor.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl core::fmt::Debug for SectionDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_valid() {
            write!(f, "Section(base={:#010x}, {:?})", self.base(), self.perm())
        } else {
            write!(f, "Section(invalid)")
        }
    }
}

/// Error type for section mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// The slot for this virtual section already holds a valid entry.
    #[error("virtual section {0} already mapped")]
    AlreadyMapped(VirtAddr),
    /// The physical address cannot be expressed in a section entry.
    #[error("physical address {0} is not 32-bit addressable")]
    Unaddressable(PhysAddr),
}

/// A first-level translation table.
///
/// 4096 entries of 4 bytes; the hardware requires 16 KiB alignment.
#[repr(C, align(16384))]
pub struct SectionTable {
    entries: [SectionDescriptor; L1_ENTRIES],
}

impl SectionTable {
    /// Create a new empty table (all entries invalid).
    pub const fn new() -> Self {
        Self {
            entries: [SectionDescriptor::invalid(); L1_ENTRIES],
        }
    }

    /// Zero-fill the table storage at physical address `addr` and borrow it.
    ///
    /// # Safety
    /// `addr` must be 16 KiB aligned, identity accessible, at least 16 KiB
    /// long, and not referenced by anything else for `'a`.
    pub unsafe fn zeroed_at<'a>(addr: usize) -> &'a mut Self {
        let table = addr as *mut Self;
        // SAFETY: The caller guarantees exclusive access to the storage.
        // An all-zero table is a valid value: every entry is a fault entry.
        unsafe {
            core::ptr::write_bytes(table, 0, 1);
            &mut *table
        }
    }

    /// Map the 1 MiB section at `va` to `pa`.
    ///
    /// Both addresses are used as given; only bits [31:20] matter.
    pub fn map_section(
        &mut self,
        pa: PhysAddr,
        va: VirtAddr,
        perm: Perm,
    ) -> Result<(), MappingError> {
        let pa = pa.as_u32().ok_or(MappingError::Unaddressable(pa))?;
        let slot = &mut self.entries[va.section_index()];
        if slot.is_valid() {
            return Err(MappingError::AlreadyMapped(va));
        }
        *slot = SectionDescriptor::section(pa, perm);
        Ok(())
    }

    /// Identity map every section `region` touches.
    ///
    /// Returns the number of sections written.
    pub fn map_region(&mut self, region: Region, perm: Perm) -> Result<usize, MappingError> {
        if region.is_empty() {
            return Ok(0);
        }
        let start = region.base.align_down(SECTION_SIZE);
        let end = region
            .end()
            .align_up(SECTION_SIZE)
            .ok_or(MappingError::Unaddressable(region.end()))?;

        let mut count = 0;
        let mut pa = start;
        while pa < end {
            let va = pa.as_u32().ok_or(MappingError::Unaddressable(pa))?;
            self.map_section(pa, VirtAddr::new(va), perm)?;
            count += 1;
            pa = PhysAddr::new(pa.as_u64() + SECTION_SIZE);
        }
        Ok(count)
    }

    /// Get the entry for a first-level index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<SectionDescriptor> {
        self.entries.get(index).copied()
    }

    /// Get the entry translating `va`.
    #[inline]
    pub fn entry(&self, va: VirtAddr) -> SectionDescriptor {
        self.entries[va.section_index()]
    }

    /// Iterate over all valid entries with their indices.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, SectionDescriptor)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.is_valid())
    }

    /// Address of the table, as programmed into TTBR0.
    pub fn base_address(&self) -> usize {
        self as *const Self as usize
    }
}

impl Default for SectionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_encoding() {
        let d = SectionDescriptor::section(0x0900_0000, Perm::READ | Perm::WRITE | Perm::DEVICE);
        assert_eq!(d.bits(), 0x0900_0416);
        assert!(d.is_section());
        assert_eq!(d.domain(), 0);
        assert_eq!(d.tex(), 0);
        assert_eq!(d.perm(), Perm::READ | Perm::WRITE | Perm::DEVICE);
    }

    #[test]
    fn test_normal_encoding() {
        let code = SectionDescriptor::section(0x4000_0000, Perm::READ | Perm::WRITE | Perm::EXEC);
        assert_eq!(code.bits(), 0x4001_140e);
        assert_eq!(code.tex(), 0b001);

        let ro = SectionDescriptor::section(0x4000_0000, Perm::READ);
        assert_eq!(ro.bits(), 0x4001_941e);
        assert_eq!(ro.perm(), Perm::READ);

        // Read is implied even when not asked for.
        assert_eq!(SectionDescriptor::section(0x4000_0000, Perm::empty()), ro);
    }

    #[test]
    fn test_low_bits_of_pa_are_dropped() {
        let d = SectionDescriptor::section(0x4012_3456, Perm::READ);
        assert_eq!(d.base(), 0x4010_0000);
    }

    #[test]
    fn test_fresh_table_is_invalid() {
        let table = Box::new(SectionTable::new());
        assert_eq!(table.iter_valid().count(), 0);
        assert_eq!(table.base_address() % 16384, 0);
    }

    #[test]
    fn test_map_section_once() {
        let mut table = Box::new(SectionTable::new());
        let va = VirtAddr::new(0x4000_0000);
        table
            .map_section(PhysAddr::new(0x4000_0000), va, Perm::READ | Perm::WRITE)
            .unwrap();
        assert_eq!(table.entry(va).base(), 0x4000_0000);
        assert_eq!(table.get(0x400), Some(table.entry(va)));

        let first = table.entry(va);
        assert_eq!(
            table.map_section(PhysAddr::new(0x5000_0000), va, Perm::READ),
            Err(MappingError::AlreadyMapped(va))
        );
        // The first entry is untouched.
        assert_eq!(table.entry(va), first);
    }

    #[test]
    fn test_unaddressable_pa() {
        let mut table = Box::new(SectionTable::new());
        let pa = PhysAddr::new(0x1_0000_0000);
        assert_eq!(
            table.map_section(pa, VirtAddr::new(0), Perm::READ),
            Err(MappingError::Unaddressable(pa))
        );
        assert_eq!(table.iter_valid().count(), 0);
    }

    #[test]
    fn test_map_region_covers_partial_sections() {
        let mut table = Box::new(SectionTable::new());
        let n = table
            .map_region(Region::new(0x400f_f000, 0x2000), Perm::READ | Perm::WRITE)
            .unwrap();
        assert_eq!(n, 2);
        let mapped: Vec<_> = table.iter_valid().map(|(i, _)| i).collect();
        assert_eq!(mapped, [0x400, 0x401]);

        assert_eq!(table.map_region(Region::new(0x5000_0000, 0), Perm::READ), Ok(0));

        // Overlapping the first region by one section fails on that section.
        assert_eq!(
            table.map_region(Region::new(0x4010_0000, SECTION_SIZE), Perm::READ),
            Err(MappingError::AlreadyMapped(VirtAddr::new(0x4010_0000)))
        );
    }

    #[test]
    fn test_map_region_top_of_address_space() {
        let mut table = Box::new(SectionTable::new());
        let n = table
            .map_region(Region::new(0xfff0_0000, SECTION_SIZE), Perm::READ)
            .unwrap();
        assert_eq!(n, 1);
        assert!(table.get(L1_ENTRIES - 1).unwrap().is_valid());
    }
}
