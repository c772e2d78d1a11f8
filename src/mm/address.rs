//! Physical and Virtual Address Types
//!
//! Type-safe wrappers that keep physical addresses (which may exceed
//! 32 bits when firmware uses two address cells) apart from the 32-bit
//! virtual addresses the short-descriptor format translates.
//!
//! # Properties
//! - Alignment helpers are checked; rounding never wraps silently
//! - Physical addresses cannot be dereferenced directly

use core::fmt;

use crate::config::SECTION_SIZE;

/// Bits to shift for the first-level table index.
pub const SECTION_SHIFT: u32 = 20;

/// Number of entries in a first-level translation table.
pub const L1_ENTRIES: usize = 4096;

/// A physical memory address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    /// Create a new physical address.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Narrow to a 32-bit address, if it fits.
    #[inline]
    pub fn as_u32(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }

    /// Check alignment to `align`, which must be a power of two.
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1) == 0
    }

    /// Round down to a multiple of `align`.
    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self(self.0 & !(align - 1))
    }

    /// Round up to a multiple of `align`, or `None` on overflow.
    #[inline]
    pub const fn align_up(self, align: u64) -> Option<Self> {
        debug_assert!(align.is_power_of_two());
        match self.0.checked_add(align - 1) {
            Some(v) => Some(Self(v & !(align - 1))),
            None => None,
        }
    }

    /// Add an offset, or `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: u64) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A 32-bit virtual address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// First-level table index: bits [31:20].
    #[inline]
    pub const fn section_index(self) -> usize {
        (self.0 >> SECTION_SHIFT) as usize
    }

    /// Check if the address is section-aligned.
    #[inline]
    pub const fn is_section_aligned(self) -> bool {
        self.0 as u64 & (SECTION_SIZE - 1) == 0
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A physical `(base, length)` range.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub base: PhysAddr,
    pub len: u64,
}

impl Region {
    pub const fn new(base: u64, len: u64) -> Self {
        Self {
            base: PhysAddr::new(base),
            len,
        }
    }

    /// Build a region from a half-open `[start, end)` pair.
    pub fn from_bounds(start: PhysAddr, end: PhysAddr) -> Option<Self> {
        let len = end.as_u64().checked_sub(start.as_u64())?;
        Some(Self { base: start, len })
    }

    /// One past the last byte. Saturates for ranges that reach the top of
    /// the 64-bit space.
    #[inline]
    pub const fn end(&self) -> PhysAddr {
        PhysAddr::new(self.base.as_u64().saturating_add(self.len))
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `addr` lies within the region.
    #[inline]
    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// Whether `other` lies entirely within the region.
    #[inline]
    pub fn encloses(&self, other: &Region) -> bool {
        other.base >= self.base && other.end() <= self.end()
    }

    /// Whether the two regions share at least one byte.
    #[inline]
    pub fn overlaps(&self, other: &Region) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.base < other.end()
            && other.base < self.end()
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.base.as_u64(), self.end().as_u64())
    }
}
