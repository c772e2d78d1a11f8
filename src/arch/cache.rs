//! Data cache discovery and set/way maintenance.
//!
//! CLIDR holds a 3-bit cache type per level for up to seven levels. For each
//! level that holds data, CCSIDR (after selecting the level through CSSELR)
//! gives the geometry:
//!
//! ```text
//!  27          13 12          3 2     0
//! +--------------+-------------+-------+
//! |   NumSets-1  |   Assoc-1   | Line  |
//! +--------------+-------------+-------+
//! ```
//!
//! The DCCISW argument packs the level at `[3:1]`, the set starting at
//! `Line + 4` and the way in the top bits.

use super::CacheMaintenance;

/// Levels described by CLIDR.
pub const MAX_CACHE_LEVELS: u32 = 7;

const CLIDR_CTYPE_BITS: u32 = 3;
const CLIDR_CTYPE_MASK: u32 = 0b111;

const CCSIDR_LINE_MASK: u32 = 0x7;
const CCSIDR_ASSOC_SHIFT: u32 = 3;
const CCSIDR_ASSOC_MASK: u32 = 0x3ff;
const CCSIDR_SETS_SHIFT: u32 = 13;
const CCSIDR_SETS_MASK: u32 = 0x7fff;

/// Cache type of one CLIDR level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    None,
    Instruction,
    Data,
    Separate,
    Unified,
    Reserved(u32),
}

impl CacheType {
    /// Decode the type of `level` (0-based) from a CLIDR value.
    pub const fn from_clidr(clidr: u32, level: u32) -> Self {
        match (clidr >> (level * CLIDR_CTYPE_BITS)) & CLIDR_CTYPE_MASK {
            0 => Self::None,
            1 => Self::Instruction,
            2 => Self::Data,
            3 => Self::Separate,
            4 => Self::Unified,
            other => Self::Reserved(other),
        }
    }

    /// Whether this level caches data and needs cleaning.
    pub const fn has_data(self) -> bool {
        matches!(self, Self::Data | Self::Separate | Self::Unified)
    }
}

/// Geometry of one data cache level, as encoded in CCSIDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    /// log2(words per line) - 2.
    pub line: u32,
    /// Number of ways minus one.
    pub assoc: u32,
    /// Number of sets minus one.
    pub sets: u32,
}

impl CacheGeometry {
    pub const fn from_ccsidr(ccsidr: u32) -> Self {
        Self {
            line: ccsidr & CCSIDR_LINE_MASK,
            assoc: (ccsidr >> CCSIDR_ASSOC_SHIFT) & CCSIDR_ASSOC_MASK,
            sets: (ccsidr >> CCSIDR_SETS_SHIFT) & CCSIDR_SETS_MASK,
        }
    }

    pub const fn ways(&self) -> u32 {
        self.assoc + 1
    }

    pub const fn set_count(&self) -> u32 {
        self.sets + 1
    }

    /// Line size in bytes.
    pub const fn line_bytes(&self) -> u32 {
        1 << (self.line + 4)
    }

    /// Position of the way field: leading zeros of `assoc`.
    pub const fn way_shift(&self) -> u32 {
        self.assoc.leading_zeros()
    }

    pub const fn set_shift(&self) -> u32 {
        self.line + 4
    }

    /// DCCISW operand for `way`/`set` at `level` (0-based).
    pub fn set_way(&self, level: u32, way: u32, set: u32) -> u32 {
        // A direct-mapped level has no way bits; shifting by 32 would overflow.
        let way_bits = way.checked_shl(self.way_shift()).unwrap_or(0);
        (level << 1) | (set << self.set_shift()) | way_bits
    }
}

/// Clean and invalidate every data-bearing cache level by set/way.
///
/// Instruction-only and reserved levels are skipped; the first level with
/// no cache ends the walk. Returns the number of levels cleaned.
pub fn clean_invalidate_all_data_caches<M>(m: &mut M) -> u32
where
    M: CacheMaintenance + ?Sized,
{
    let clidr = m.clidr();
    let mut cleaned = 0;

    for level in 0..MAX_CACHE_LEVELS {
        let ctype = CacheType::from_clidr(clidr, level);
        match ctype {
            CacheType::None => break,
            CacheType::Reserved(bits) => {
                log::warn!("L{} reports reserved cache type {:#b}, skipped", level + 1, bits);
                continue;
            }
            _ if !ctype.has_data() => continue,
            _ => {}
        }

        let geometry = CacheGeometry::from_ccsidr(m.ccsidr(level));
        log::trace!(
            "L{} {:?}: {} ways x {} sets, {}-byte lines",
            level + 1,
            ctype,
            geometry.ways(),
            geometry.set_count(),
            geometry.line_bytes()
        );

        for way in 0..=geometry.assoc {
            for set in 0..=geometry.sets {
                m.clean_invalidate_set_way(geometry.set_way(level, way, set));
            }
        }
        cleaned += 1;
    }

    m.sync();
    cleaned
}
