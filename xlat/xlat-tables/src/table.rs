//! # Translation Tables
//!
//! One granule-sized, granule-aligned array of 512 descriptors, plus the
//! strongly-typed index derived from a virtual address and a level.

use crate::descriptor::Entry;
use xlat_addresses::{GRANULE_SIZE, Level, TABLE_ENTRIES, VirtualAddress};

/// Index into a translation table (`0..512`).
///
/// The newtype prevents accidental mixing with other integers and keeps the
/// range check in one place.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntryIndex(u16);

impl EntryIndex {
    /// The index `va` selects at `level`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress, level: Level) -> Self {
        Self::new(va.table_index(level) as u16)
    }

    /// Construct from a raw value.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < TABLE_ENTRIES);
        Self(v)
    }

    /// Return the index as `usize` for table access.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One stage-1 translation table: 512 entries, 8 bytes each, granule
/// aligned as the walk hardware requires.
#[repr(C, align(4096))]
pub struct TranslationTable {
    entries: [Entry; TABLE_ENTRIES],
}

const _: () = assert!(size_of::<TranslationTable>() as u64 == GRANULE_SIZE);

impl TranslationTable {
    /// A fully zeroed (all entries free) table.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [Entry::free(); TABLE_ENTRIES],
        }
    }

    /// Read the entry at `i`.
    ///
    /// Plain load; implies no TLB maintenance.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: EntryIndex) -> Entry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller is responsible for TLB invalidation if this table is
    /// reachable from a live `TTBR0`.
    #[inline]
    pub const fn set(&mut self, i: EntryIndex, e: Entry) {
        self.entries[i.as_usize()] = e;
    }

    /// Clear the entry at `i` back to free.
    #[inline]
    pub const fn set_zero(&mut self, i: EntryIndex) {
        self.set(i, Entry::free());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TableDescriptor;
    use xlat_addresses::PhysicalAddress;

    #[test]
    fn index_of_selects_level_bits() {
        // L0 index 1, L1 index 2, L2 index 3, L3 index 4.
        let va = VirtualAddress::new(0x0080_8060_4000);
        assert_eq!(EntryIndex::of(va, Level::new(0)).as_usize(), 1);
        assert_eq!(EntryIndex::of(va, Level::new(1)).as_usize(), 2);
        assert_eq!(EntryIndex::of(va, Level::new(2)).as_usize(), 3);
        assert_eq!(EntryIndex::of(va, Level::new(3)).as_usize(), 4);
    }

    #[test]
    fn set_get_round_trip() {
        let mut table = TranslationTable::zeroed();
        let i = EntryIndex::new(17);
        assert!(table.get(i).is_free());

        let e = Entry::from_table(TableDescriptor::link(PhysicalAddress::new(0x9000), 3));
        table.set(i, e);
        assert_eq!(table.get(i).into_bits(), e.into_bits());

        table.set_zero(i);
        assert!(table.get(i).is_free());
    }
}
