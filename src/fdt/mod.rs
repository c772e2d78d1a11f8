//! Flattened Device Tree decoder
//!
//! Validates and walks the big-endian, token-stream description of the
//! hardware that firmware hands to the loader.
//!
//! # Blob layout
//! - A 40-byte header (ten big-endian words)
//! - A memory reservation map: `(address, size)` pairs of 64-bit values,
//!   terminated by a zero/zero entry
//! - The structure block: a stream of 32-bit tokens describing nodes and
//!   properties
//! - The strings block: NUL-terminated property names
//!
//! # Safety Properties
//! - The handle is a view over a byte slice; every read goes through
//!   bounds-checked slice accessors
//! - Traversal never steps outside `[structs, structs + structlen)`; a
//!   truncated or inconsistent stream yields `None`, never a wild read
//! - Nodes and properties are plain offsets into the structure block, so no
//!   tree is ever materialised

mod dump;
mod memrsv;
mod node;

#[cfg(test)]
pub(crate) mod builder;

pub use dump::TreeDump;
pub use memrsv::MemReservations;
pub use node::{Children, Node, Prop, Properties};

/// Magic number in the first header word.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// The only structure version this decoder understands.
pub const FDT_VERSION: u32 = 0x11;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 40;

/// Size of a single memory reservation entry.
pub const MEMRSV_ENTRY_SIZE: usize = 16;

/// Structure block tokens.
pub(crate) mod token {
    pub const BEGIN_NODE: u32 = 0x01;
    pub const END_NODE: u32 = 0x02;
    pub const PROP: u32 = 0x03;
    pub const NOP: u32 = 0x04;
    pub const END: u32 = 0x09;
}

/// Structural errors reported while validating or reading a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FdtError {
    /// The first header word is not `0xd00dfeed`.
    #[error("bad device tree magic")]
    BadMagic,
    /// The blob is not a version 17 tree.
    #[error("unsupported device tree version")]
    BadVersion,
    /// The declared total size cannot hold the header, or exceeds the blob.
    #[error("bad device tree size")]
    BadSize,
    /// The structure block lies outside the blob or is malformed.
    #[error("bad device tree structure block")]
    BadStruct,
    /// The strings block lies outside the blob, or a name is unterminated.
    #[error("bad device tree strings block")]
    BadString,
    /// The memory reservation map lies outside the blob.
    #[error("bad device tree memory reservation map")]
    BadMemRsvd,
    /// A property refers to a name outside the strings block.
    #[error("invalid string reference")]
    InvalidReference,
}

/// Decoded header fields, converted to host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    magic: u32,
    total_size: u32,
    off_struct: u32,
    off_strings: u32,
    off_rsvmap: u32,
    version: u32,
    last_comp_version: u32,
    boot_cpuid: u32,
    size_strings: u32,
    size_struct: u32,
}

impl Header {
    fn read(blob: &[u8]) -> Option<Self> {
        let word = |index: usize| read_be32(blob, index * 4);
        Some(Self {
            magic: word(0)?,
            total_size: word(1)?,
            off_struct: word(2)?,
            off_strings: word(3)?,
            off_rsvmap: word(4)?,
            version: word(5)?,
            last_comp_version: word(6)?,
            boot_cpuid: word(7)?,
            size_strings: word(8)?,
            size_struct: word(9)?,
        })
    }
}

/// Read a big-endian word at `off`, if it lies entirely within `bytes`.
#[inline]
pub(crate) fn read_be32(bytes: &[u8], off: usize) -> Option<u32> {
    let end = off.checked_add(4)?;
    let raw = bytes.get(off..end)?;
    Some(u32::from_be_bytes(<[u8; 4]>::try_from(raw).ok()?))
}

/// Read a big-endian double word at `off`.
#[inline]
pub(crate) fn read_be64(bytes: &[u8], off: usize) -> Option<u64> {
    let end = off.checked_add(8)?;
    let raw = bytes.get(off..end)?;
    Some(u64::from_be_bytes(<[u8; 8]>::try_from(raw).ok()?))
}

/// Whether `[off, off + len)` fits inside a blob of `size` bytes.
#[inline]
fn span_fits(off: u32, len: u32, size: u32) -> bool {
    off <= size && len <= size && off.checked_add(len).is_some_and(|end| end <= size)
}

/// A validated device tree.
///
/// Cheap to copy; all traversal state lives in the [`Node`] and [`Prop`]
/// offsets handed back to the caller.
#[derive(Clone, Copy)]
pub struct Fdt<'a> {
    blob: &'a [u8],
    header: Header,
    structs: &'a [u8],
    strings: &'a [u8],
}

impl<'a> Fdt<'a> {
    /// Validate a blob held in `blob`.
    ///
    /// Checks, in order: the header can be read, magic, version, total
    /// size, then the structure, strings and reservation spans against the
    /// declared total size. Finally the structure block must open with a
    /// begin-node token (after any no-ops) and close with the end token.
    pub fn from_slice(blob: &'a [u8]) -> Result<Self, FdtError> {
        let header = Header::read(blob).ok_or(FdtError::BadSize)?;

        if header.magic != FDT_MAGIC {
            return Err(FdtError::BadMagic);
        }
        if header.version != FDT_VERSION {
            return Err(FdtError::BadVersion);
        }

        let size = header.total_size;
        if (size as usize) < HEADER_SIZE || size as usize > blob.len() {
            return Err(FdtError::BadSize);
        }
        if !span_fits(header.off_struct, header.size_struct, size) {
            return Err(FdtError::BadStruct);
        }
        if !span_fits(header.off_strings, header.size_strings, size) {
            return Err(FdtError::BadString);
        }
        if !span_fits(header.off_rsvmap, MEMRSV_ENTRY_SIZE as u32, size) {
            return Err(FdtError::BadMemRsvd);
        }

        let blob = &blob[..size as usize];
        let structs = subslice(blob, header.off_struct, header.size_struct)
            .ok_or(FdtError::BadStruct)?;
        let strings = subslice(blob, header.off_strings, header.size_strings)
            .ok_or(FdtError::BadString)?;

        let fdt = Self {
            blob,
            header,
            structs,
            strings,
        };
        fdt.check_struct_bounds()?;
        Ok(fdt)
    }

    fn check_struct_bounds(&self) -> Result<(), FdtError> {
        let mut off = 0;
        loop {
            match self.word(off) {
                Some(token::NOP) => off += 4,
                Some(token::BEGIN_NODE) => break,
                _ => return Err(FdtError::BadStruct),
            }
        }

        let last = self
            .structs
            .len()
            .checked_sub(4)
            .ok_or(FdtError::BadStruct)?;
        if self.word(last) != Some(token::END) {
            return Err(FdtError::BadStruct);
        }
        Ok(())
    }

    /// Declared size of the whole blob.
    pub fn total_size(&self) -> u32 {
        self.header.total_size
    }

    /// Physical id of the CPU that booted.
    pub fn boot_cpuid(&self) -> u32 {
        self.header.boot_cpuid
    }

    /// Oldest version this blob claims to be compatible with.
    pub fn last_comp_version(&self) -> u32 {
        self.header.last_comp_version
    }

    /// The blob bytes, `totalsize` long.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.blob
    }

    /// Length of the structure block.
    pub fn struct_len(&self) -> usize {
        self.structs.len()
    }

    /// Length of the strings block.
    pub fn strings_len(&self) -> usize {
        self.strings.len()
    }

    /// Entries of the memory reservation map, up to the zero/zero sentinel.
    pub fn memory_reservations(&self) -> MemReservations<'a> {
        let map = self
            .blob
            .get(self.header.off_rsvmap as usize..)
            .unwrap_or_default();
        MemReservations::new(map)
    }

    /// Render the tree for diagnostics.
    pub fn dump(&self) -> TreeDump<'_, 'a> {
        TreeDump::new(self)
    }

    #[inline]
    pub(crate) fn word(&self, off: usize) -> Option<u32> {
        read_be32(self.structs, off)
    }

    #[inline]
    pub(crate) fn structs(&self) -> &'a [u8] {
        self.structs
    }

    #[inline]
    pub(crate) fn strings(&self) -> &'a [u8] {
        self.strings
    }
}

impl Fdt<'static> {
    /// Validate the blob at physical address `addr`.
    ///
    /// # Safety
    /// `addr` must point at readable memory holding at least the 40-byte
    /// header, and at least `totalsize` bytes if the header claims more.
    /// That memory must stay intact for as long as the handle is used.
    pub unsafe fn from_addr(addr: usize) -> Result<Self, FdtError> {
        // SAFETY: The caller guarantees the header is readable.
        let head = unsafe { core::slice::from_raw_parts(addr as *const u8, HEADER_SIZE) };
        let header = Header::read(head).ok_or(FdtError::BadSize)?;
        if header.magic != FDT_MAGIC {
            return Err(FdtError::BadMagic);
        }
        if header.version != FDT_VERSION {
            return Err(FdtError::BadVersion);
        }
        let len = header.total_size as usize;
        if len < HEADER_SIZE || len > isize::MAX as usize {
            return Err(FdtError::BadSize);
        }

        // SAFETY: The caller guarantees `totalsize` bytes are readable, and
        // the length is within what a slice may span.
        let blob = unsafe { core::slice::from_raw_parts(addr as *const u8, len) };
        Fdt::from_slice(blob)
    }
}

impl core::fmt::Debug for Fdt<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fdt")
            .field("total_size", &self.header.total_size)
            .field("struct_len", &self.structs.len())
            .field("strings_len", &self.strings.len())
            .finish()
    }
}

fn subslice(blob: &[u8], off: u32, len: u32) -> Option<&[u8]> {
    let start = off as usize;
    let end = start.checked_add(len as usize)?;
    blob.get(start..end)
}
