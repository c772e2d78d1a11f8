//! Memory reservation map.

use super::{read_be64, MEMRSV_ENTRY_SIZE};
use crate::mm::address::Region;

/// Lazy iterator over `(address, size)` reservation entries.
///
/// Stops at the zero/zero sentinel, or at the end of the blob if the
/// sentinel is missing.
#[derive(Clone)]
pub struct MemReservations<'a> {
    map: &'a [u8],
    off: usize,
    done: bool,
}

impl<'a> MemReservations<'a> {
    pub(super) fn new(map: &'a [u8]) -> Self {
        Self {
            map,
            off: 0,
            done: false,
        }
    }
}

impl Iterator for MemReservations<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        if self.done {
            return None;
        }
        let entry = read_be64(self.map, self.off).zip(read_be64(self.map, self.off + 8));
        match entry {
            Some((address, size)) if address != 0 || size != 0 => {
                self.off += MEMRSV_ENTRY_SIZE;
                Some(Region::new(address, size))
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::builder::FdtBuilder;
    use super::super::Fdt;
    use super::*;

    #[test]
    fn test_reservations_until_sentinel() {
        let mut b = FdtBuilder::new();
        b.reserve(0x4000_0000, 0x1_0000)
            .reserve(0x4800_0000, 0x20_0000)
            .begin_node("")
            .end_node();
        let blob = b.finish();
        let fdt = Fdt::from_slice(&blob).unwrap();
        let entries: Vec<_> = fdt.memory_reservations().collect();
        assert_eq!(
            entries,
            [
                Region::new(0x4000_0000, 0x1_0000),
                Region::new(0x4800_0000, 0x20_0000)
            ]
        );
    }

    #[test]
    fn test_no_reservations() {
        let mut b = FdtBuilder::new();
        b.begin_node("").end_node();
        let blob = b.finish();
        let fdt = Fdt::from_slice(&blob).unwrap();
        assert_eq!(fdt.memory_reservations().count(), 0);
    }

    #[test]
    fn test_missing_sentinel_stops_at_map_end() {
        let mut map = Vec::new();
        map.extend_from_slice(&0x4000_0000u64.to_be_bytes());
        map.extend_from_slice(&0x1000u64.to_be_bytes());
        // A torn second entry.
        map.extend_from_slice(&0x5000_0000u64.to_be_bytes());
        let mut iter = MemReservations::new(&map);
        assert_eq!(iter.next(), Some(Region::new(0x4000_0000, 0x1000)));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }
}
