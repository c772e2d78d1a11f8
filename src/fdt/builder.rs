//! Test-only device tree assembler.

use super::{token, FDT_MAGIC, FDT_VERSION, HEADER_SIZE};

pub(crate) const HDR_MAGIC: usize = 0;
pub(crate) const HDR_TOTAL_SIZE: usize = 1;
pub(crate) const HDR_OFF_STRUCT: usize = 2;
pub(crate) const HDR_OFF_STRINGS: usize = 3;
pub(crate) const HDR_OFF_RSVMAP: usize = 4;
pub(crate) const HDR_VERSION: usize = 5;
pub(crate) const HDR_LAST_COMP: usize = 6;
pub(crate) const HDR_BOOT_CPUID: usize = 7;
pub(crate) const HDR_SIZE_STRINGS: usize = 8;
pub(crate) const HDR_SIZE_STRUCT: usize = 9;

pub(crate) fn header_word(blob: &[u8], index: usize) -> u32 {
    let at = index * 4;
    u32::from_be_bytes(blob[at..at + 4].try_into().unwrap())
}

pub(crate) fn set_header_word(blob: &mut [u8], index: usize, value: u32) {
    let at = index * 4;
    blob[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

/// Builds blobs token by token. `finish` appends the end token.
#[derive(Default, Clone)]
pub(crate) struct FdtBuilder {
    structs: Vec<u8>,
    strings: Vec<u8>,
    reservations: Vec<(u64, u64)>,
    boot_cpuid: u32,
    strings_first: bool,
}

impl FdtBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn word(&mut self, value: u32) -> &mut Self {
        self.structs.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn pad(&mut self) {
        while self.structs.len() % 4 != 0 {
            self.structs.push(0);
        }
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let mut off = 0;
        for existing in self.strings.split(|&b| b == 0) {
            if existing == name.as_bytes() {
                return off as u32;
            }
            off += existing.len() + 1;
        }
        let off = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        off as u32
    }

    pub(crate) fn reserve(&mut self, address: u64, size: u64) -> &mut Self {
        self.reservations.push((address, size));
        self
    }

    pub(crate) fn boot_cpuid(&mut self, id: u32) -> &mut Self {
        self.boot_cpuid = id;
        self
    }

    /// Place the strings block before the structure block.
    pub(crate) fn strings_first(&mut self) -> &mut Self {
        self.strings_first = true;
        self
    }

    pub(crate) fn begin_node(&mut self, name: &str) -> &mut Self {
        self.word(token::BEGIN_NODE);
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        self.pad();
        self
    }

    pub(crate) fn end_node(&mut self) -> &mut Self {
        self.word(token::END_NODE)
    }

    pub(crate) fn nop(&mut self) -> &mut Self {
        self.word(token::NOP)
    }

    pub(crate) fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_off = self.string_offset(name);
        self.word(token::PROP)
            .word(value.len() as u32)
            .word(name_off);
        self.structs.extend_from_slice(value);
        self.pad();
        self
    }

    pub(crate) fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop(name, &value.to_be_bytes())
    }

    pub(crate) fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let value: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes()).collect();
        self.prop(name, &value)
    }

    /// Length of the structure block written so far.
    pub(crate) fn struct_len(&self) -> usize {
        self.structs.len()
    }

    pub(crate) fn finish(&self) -> Vec<u8> {
        let mut structs = self.structs.clone();
        structs.extend_from_slice(&token::END.to_be_bytes());
        self.assemble(&structs)
    }

    pub(crate) fn finish_without_end(&self) -> Vec<u8> {
        self.assemble(&self.structs)
    }

    /// Cut the structure block after `cut` bytes, then close it with the
    /// end token so that the blob still passes validation.
    pub(crate) fn finish_truncated(&self, cut: usize) -> Vec<u8> {
        let mut structs = self.structs[..cut].to_vec();
        structs.extend_from_slice(&token::END.to_be_bytes());
        self.assemble(&structs)
    }

    fn assemble(&self, structs: &[u8]) -> Vec<u8> {
        let mut blob = vec![0u8; HEADER_SIZE];

        let rsvmap = blob.len();
        for &(address, size) in &self.reservations {
            blob.extend_from_slice(&address.to_be_bytes());
            blob.extend_from_slice(&size.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; 16]);

        let (first, second) = if self.strings_first {
            (&self.strings[..], structs)
        } else {
            (structs, &self.strings[..])
        };
        let first_off = blob.len();
        blob.extend_from_slice(first);
        while blob.len() % 4 != 0 {
            blob.push(0);
        }
        let second_off = blob.len();
        blob.extend_from_slice(second);

        let (struct_off, strings_off) = if self.strings_first {
            (second_off, first_off)
        } else {
            (first_off, second_off)
        };

        let total = blob.len() as u32;
        set_header_word(&mut blob, HDR_MAGIC, FDT_MAGIC);
        set_header_word(&mut blob, HDR_TOTAL_SIZE, total);
        set_header_word(&mut blob, HDR_OFF_STRUCT, struct_off as u32);
        set_header_word(&mut blob, HDR_OFF_STRINGS, strings_off as u32);
        set_header_word(&mut blob, HDR_OFF_RSVMAP, rsvmap as u32);
        set_header_word(&mut blob, HDR_VERSION, FDT_VERSION);
        set_header_word(&mut blob, HDR_LAST_COMP, 0x10);
        set_header_word(&mut blob, HDR_BOOT_CPUID, self.boot_cpuid);
        set_header_word(&mut blob, HDR_SIZE_STRINGS, self.strings.len() as u32);
        set_header_word(&mut blob, HDR_SIZE_STRUCT, structs.len() as u32);
        blob
    }
}

/// The tree used across planner and orchestrator tests: a root with cell
/// widths, `/chosen` with archive bounds, and `/memory` with `reg`.
pub(crate) fn boot_tree(cells: (u32, u32), initrd: (u32, u32), reg: &[u32]) -> FdtBuilder {
    let mut b = FdtBuilder::new();
    b.begin_node("")
        .prop_u32("#address-cells", cells.0)
        .prop_u32("#size-cells", cells.1)
        .begin_node("chosen")
        .prop_u32("linux,initrd-start", initrd.0)
        .prop_u32("linux,initrd-end", initrd.1)
        .end_node()
        .begin_node("memory")
        .prop("device_type", b"memory\0")
        .prop_cells("reg", reg)
        .end_node()
        .end_node();
    b
}
