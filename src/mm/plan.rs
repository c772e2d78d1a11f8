//! Boot archive and memory range discovery.
//!
//! Reads `/chosen` for the archive staged by firmware and `/memory` for the
//! RAM ranges, then picks the range the loader will carve its arenas from.
//!
//! Selection is first match: the first range that contains the archive
//! start and has room for the archive (rounded up to 1 MiB) plus
//! [`ARCHIVE_RESERVE`] wins. Ranges are neither merged nor ranked; a
//! machine whose only suitable range is split across several `reg`
//! entries is rejected.

use super::address::{PhysAddr, Region};
use crate::config::{ARCHIVE_RESERVE, SECTION_SIZE};
use crate::fdt::{Fdt, Node};

pub const ROOT_PATH: &str = "/";
pub const CHOSEN_PATH: &str = "/chosen";
pub const MEMORY_PATH: &str = "/memory";

pub const INITRD_START: &str = "linux,initrd-start";
pub const INITRD_END: &str = "linux,initrd-end";
pub const ADDRESS_CELLS: &str = "#address-cells";
pub const SIZE_CELLS: &str = "#size-cells";
pub const REG: &str = "reg";

/// Failures while planning the physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("no {0} node in the device tree")]
    MissingNode(&'static str),
    #[error("{node} has no {prop} property")]
    MissingProperty {
        node: &'static str,
        prop: &'static str,
    },
    #[error("{node}:{prop} has unexpected length {len}")]
    InvalidPropertyLength {
        node: &'static str,
        prop: &'static str,
        len: usize,
    },
    #[error("boot archive bounds [{start:#x}, {end:#x}) are empty or inverted")]
    InvalidArchiveBounds { start: u32, end: u32 },
    #[error("{prop} is {cells}; only 1 or 2 cells are supported")]
    UnsupportedCellWidth { prop: &'static str, cells: u32 },
    #[error("no memory range holds the boot archive and its working space")]
    NoSuitableMemory,
}

/// Cell widths from the root node, each 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWidths {
    pub address: u32,
    pub size: u32,
}

impl CellWidths {
    /// Bytes per `(address, size)` tuple in a `reg` property.
    pub const fn tuple_len(&self) -> usize {
        ((self.address + self.size) * 4) as usize
    }
}

/// What the planner found: the archive and the memory range around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPlan {
    pub archive: Region,
    pub memory: Region,
}

impl MemoryPlan {
    /// Locate the archive, then the memory range to build arenas in.
    pub fn discover(fdt: &Fdt<'_>) -> Result<Self, PlanError> {
        let archive = find_archive(fdt)?;
        log::debug!("boot archive at {:?}", archive);

        let widths = cell_widths(fdt)?;
        let ranges = memory_ranges(fdt, widths)?;
        let memory = select_memory(ranges, &archive)?;
        log::debug!("selected memory range {:?}", memory);

        Ok(Self { archive, memory })
    }
}

fn required_node(fdt: &Fdt<'_>, path: &'static str) -> Result<Node, PlanError> {
    fdt.find_node(path).ok_or(PlanError::MissingNode(path))
}

/// Read a property that must hold exactly one cell.
fn required_u32(
    fdt: &Fdt<'_>,
    node: Node,
    path: &'static str,
    prop: &'static str,
) -> Result<u32, PlanError> {
    let handle = fdt.find_property(node, prop).ok_or(PlanError::MissingProperty {
        node: path,
        prop,
    })?;
    let value = fdt
        .property_value(handle)
        .ok_or(PlanError::MissingProperty { node: path, prop })?;
    fdt.prop_u32(handle).ok_or(PlanError::InvalidPropertyLength {
        node: path,
        prop,
        len: value.len(),
    })
}

/// The `[start, end)` of the archive named in `/chosen`.
pub fn find_archive(fdt: &Fdt<'_>) -> Result<Region, PlanError> {
    let chosen = required_node(fdt, CHOSEN_PATH)?;
    let start = required_u32(fdt, chosen, CHOSEN_PATH, INITRD_START)?;
    let end = required_u32(fdt, chosen, CHOSEN_PATH, INITRD_END)?;
    if start >= end {
        return Err(PlanError::InvalidArchiveBounds { start, end });
    }
    Ok(Region::new(start as u64, (end - start) as u64))
}

/// `#address-cells` and `#size-cells` from the root node.
pub fn cell_widths(fdt: &Fdt<'_>) -> Result<CellWidths, PlanError> {
    let root = required_node(fdt, ROOT_PATH)?;
    let width = |prop: &'static str| -> Result<u32, PlanError> {
        let cells = required_u32(fdt, root, ROOT_PATH, prop)?;
        match cells {
            1 | 2 => Ok(cells),
            _ => Err(PlanError::UnsupportedCellWidth { prop, cells }),
        }
    };
    Ok(CellWidths {
        address: width(ADDRESS_CELLS)?,
        size: width(SIZE_CELLS)?,
    })
}

/// The `(address, size)` tuples of `/memory`'s `reg` property.
pub fn memory_ranges<'a>(fdt: &Fdt<'a>, widths: CellWidths) -> Result<RegEntries<'a>, PlanError> {
    let memory = required_node(fdt, MEMORY_PATH)?;
    let missing = PlanError::MissingProperty {
        node: MEMORY_PATH,
        prop: REG,
    };
    let reg = fdt.find_property(memory, REG).ok_or(missing)?;
    let value = fdt.property_value(reg).ok_or(missing)?;
    if value.len() % widths.tuple_len() != 0 {
        return Err(PlanError::InvalidPropertyLength {
            node: MEMORY_PATH,
            prop: REG,
            len: value.len(),
        });
    }
    Ok(RegEntries::new(value, widths))
}

/// End of the space the planner demands past the archive start.
fn required_end(archive: &Region) -> Option<PhysAddr> {
    archive
        .end()
        .align_up(SECTION_SIZE)?
        .checked_add(ARCHIVE_RESERVE)
}

/// Pick the first range holding the archive start and the demanded space.
pub fn select_memory<I>(ranges: I, archive: &Region) -> Result<Region, PlanError>
where
    I: IntoIterator<Item = Region>,
{
    let needed = required_end(archive).ok_or(PlanError::NoSuitableMemory)?;
    ranges
        .into_iter()
        .find(|range| range.contains(archive.base) && needed <= range.end())
        .ok_or(PlanError::NoSuitableMemory)
}

/// Iterator over the tuples of a `reg` value.
#[derive(Clone)]
pub struct RegEntries<'a> {
    value: &'a [u8],
    widths: CellWidths,
    off: usize,
}

impl<'a> RegEntries<'a> {
    fn new(value: &'a [u8], widths: CellWidths) -> Self {
        Self {
            value,
            widths,
            off: 0,
        }
    }

    fn cells(&mut self, count: u32) -> Option<u64> {
        let mut acc = 0u64;
        for _ in 0..count {
            let cell = crate::fdt::read_be32(self.value, self.off)?;
            acc = (acc << 32) | cell as u64;
            self.off += 4;
        }
        Some(acc)
    }
}

impl Iterator for RegEntries<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let base = self.cells(self.widths.address)?;
        let len = self.cells(self.widths.size)?;
        Some(Region::new(base, len))
    }
}
