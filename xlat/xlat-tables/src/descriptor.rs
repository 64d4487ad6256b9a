//! # Stage-1 Translation Descriptors
//!
//! This module wraps the two descriptor forms a 4 KiB-granule stage-1 table
//! can hold, overlaid on one 64-bit word:
//!
//! - [`TableDescriptor`]: points at the next-level table (valid above the
//!   last level only).
//! - [`BlockDescriptor`]: maps memory directly — a *block* at levels 1–2, a
//!   *page* at the last level. Both forms share the same attribute layout;
//!   only the type tag at bit 1 differs.
//! - [`Entry`]: the union of the two plus the raw bits, with
//!   [`classify`](Entry::classify) decoding the tag.
//!
//! ## Semantics
//!
//! Bit 0 is the valid bit; bit 1 is the type tag. The tag is *level
//! dependent*: above the last level `1` means table and `0` means block,
//! while at the last level `1` means page and `0` is a reserved encoding
//! that translation hardware faults on (and this crate never produces).
//!
//! ## Invariants & Safety Notes
//!
//! - [`TableDescriptor::link`] stores the child's pool slot in the
//!   hardware-ignored bits `[58:51]`, so walks never have to recover a pool
//!   index from a table address.
//! - Raw constructors perform no validation; the mapping engine is the only
//!   writer and upholds alignment.

use crate::attributes::MemoryAttributes;
use bitfield_struct::bitfield;
use xlat_addresses::{GRANULE_SIZE, Level, PhysicalAddress};

/// Shareability field encoding: outer shareable.
pub const SH_OUTER_SHAREABLE: u8 = 0b10;

/// Shareability field encoding: inner shareable.
pub const SH_INNER_SHAREABLE: u8 = 0b11;

/// Valid bit shared by both descriptor forms (bit 0).
const VALID_BIT: u64 = 1 << 0;

/// Type tag shared by both descriptor forms (bit 1).
///
/// - Above the last level: `1` = table, `0` = block.
/// - At the last level: `1` = page, `0` = reserved (treated as free).
const TYPE_BIT: u64 = 1 << 1;

/// Table descriptor — pointer to the next-level translation table.
///
/// Never maps memory itself. The hierarchical permission fields
/// (`PXNTable`, `APTable`, …) are left zero so leaf descriptors alone
/// decide permissions.
#[bitfield(u64)]
pub struct TableDescriptor {
    /// **Valid** (bit 0).
    pub valid: bool,

    /// **Type** (bit 1): must be 1 for a table descriptor.
    #[bits(default = true)]
    pub table_type: bool,

    /// (bits 2..12): ignored in table descriptors.
    #[bits(10)]
    __ignored_2_11: u16,

    /// **Next-level table address** (bits 12..48): granule-aligned base,
    /// low 12 bits omitted.
    #[bits(36)]
    next_47_12: u64,

    /// (bits 48..51): reserved, must be 0.
    #[bits(3)]
    __res0_48_50: u8,

    /// **Pool slot** (bits 51..59): hardware-ignored software field holding
    /// the child table's pool handle.
    #[bits(8)]
    pub pool_slot: u8,

    /// **PXNTable** (bit 59): hierarchical privileged execute-never.
    pub pxn_table: bool,

    /// **UXNTable** (bit 60): hierarchical unprivileged execute-never.
    pub uxn_table: bool,

    /// **APTable** (bits 61..63): hierarchical access-permission limits.
    #[bits(2)]
    pub ap_table: u8,

    /// **NSTable** (bit 63): hierarchical security state.
    pub ns_table: bool,
}

impl TableDescriptor {
    /// A valid table descriptor pointing at `next`, tagged with the child's
    /// pool `slot`.
    ///
    /// ### Debug assertions
    /// - `next` must be granule-aligned.
    #[inline]
    #[must_use]
    pub const fn link(next: PhysicalAddress, slot: u8) -> Self {
        debug_assert!(next.is_aligned_to(GRANULE_SIZE));
        Self::new()
            .with_valid(true)
            .with_next_47_12(next.as_u64() >> 12)
            .with_pool_slot(slot)
    }

    /// The next-level table base address.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> PhysicalAddress {
        PhysicalAddress::new(self.next_47_12() << 12)
    }
}

/// Block/page descriptor — maps memory directly.
///
/// Identical attribute layout in both forms; [`page`](Self::page) is the
/// type tag (set at the last level, clear for blocks above it).
#[bitfield(u64)]
pub struct BlockDescriptor {
    /// **Valid** (bit 0).
    pub valid: bool,

    /// **Type** (bit 1): 1 = page (last level only), 0 = block.
    pub page: bool,

    /// **AttrIndx** (bits 2..5): index into `MAIR_EL1`.
    #[bits(3)]
    pub attr_index: u8,

    /// **NS** (bit 5): non-secure output address space.
    pub non_secure: bool,

    /// **AP[1]** (bit 6): unprivileged (EL0) access allowed.
    pub user: bool,

    /// **AP[2]** (bit 7): read-only at all privilege levels.
    pub read_only: bool,

    /// **SH** (bits 8..10): shareability.
    #[bits(2)]
    pub shareability: u8,

    /// **AF** (bit 10): access flag; clear faults on first access.
    pub accessed: bool,

    /// **nG** (bit 11): not global (ASID-tagged TLB entries).
    pub not_global: bool,

    /// **Output address** (bits 12..48): physical base, low 12 bits
    /// omitted. Blocks additionally require natural alignment to the
    /// level's span; the mapping engine enforces that before writing.
    #[bits(36)]
    output_47_12: u64,

    /// (bits 48..52): reserved, must be 0.
    #[bits(4)]
    __res0_48_51: u8,

    /// **Contiguous** (bit 52): TLB-coalescing hint, unused here.
    pub contiguous: bool,

    /// **PXN** (bit 53): privileged execute-never.
    pub pxn: bool,

    /// **UXN** (bit 54): unprivileged execute-never.
    pub uxn: bool,

    /// (bits 55..59): hardware-ignored, unused software field.
    #[bits(4)]
    pub software: u8,

    /// (bits 59..64): ignored.
    #[bits(5)]
    __ignored_59_63: u8,
}

impl BlockDescriptor {
    /// Set the output base address.
    ///
    /// ### Debug assertions
    /// - `phys` must be granule-aligned. Natural alignment for blocks is
    ///   the mapping engine's responsibility.
    #[inline]
    #[must_use]
    pub const fn with_output_address(self, phys: PhysicalAddress) -> Self {
        debug_assert!(phys.is_aligned_to(GRANULE_SIZE));
        self.with_output_47_12(phys.as_u64() >> 12)
    }

    /// The physical base this descriptor maps.
    #[inline]
    #[must_use]
    pub const fn output_address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.output_47_12() << 12)
    }
}

/// Decoded view of an [`Entry`] at a concrete level.
#[derive(Copy, Clone)]
pub enum EntryKind {
    /// Invalid/empty slot.
    Free,
    /// Pointer to the next-level table (never at the last level).
    Table(TableDescriptor),
    /// Direct mapping at an intermediate level.
    Block(BlockDescriptor),
    /// Direct mapping of a single granule at the last level.
    Page(BlockDescriptor),
}

/// One translation-table slot — [`TableDescriptor`] and [`BlockDescriptor`]
/// overlaid on the same 64-bit storage.
///
/// Use [`Entry::classify`] with the slot's level to obtain a typed view;
/// the raw word is available via `from_bits`/`into_bits`.
#[derive(Copy, Clone)]
#[repr(C)]
pub union Entry {
    /// Raw 64-bit storage of the entry.
    bits: u64,
    /// Table form (type tag 1 above the last level).
    table: TableDescriptor,
    /// Block/page form.
    block: BlockDescriptor,
}

impl Default for Entry {
    #[inline]
    fn default() -> Self {
        Self::free()
    }
}

impl Entry {
    /// An invalid (all-zero) entry.
    #[inline]
    #[must_use]
    pub const fn free() -> Self {
        Self { bits: 0 }
    }

    #[inline]
    #[must_use]
    pub const fn from_table(table: TableDescriptor) -> Self {
        Self { table }
    }

    #[inline]
    #[must_use]
    pub const fn from_block(block: BlockDescriptor) -> Self {
        Self { bits: block.into_bits() }
    }

    /// Construct from raw bits (no validation).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Extract the raw bits back out of the union.
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u64 {
        unsafe { self.bits }
    }

    /// Whether the valid bit is clear.
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.into_bits() & VALID_BIT == 0
    }

    /// Decode this entry as it would be interpreted at `level`.
    ///
    /// The type tag is level dependent: the table-shaped tag at the last
    /// level denotes a page, and the block-shaped tag at the last level is a
    /// reserved encoding this crate never writes (decoded as free).
    #[inline]
    #[must_use]
    pub const fn classify(self, level: Level) -> EntryKind {
        let bits = self.into_bits();
        if bits & VALID_BIT == 0 {
            return EntryKind::Free;
        }
        let tagged = bits & TYPE_BIT != 0;
        if level.is_last() {
            if tagged {
                EntryKind::Page(unsafe { self.block })
            } else {
                EntryKind::Free
            }
        } else if tagged {
            EntryKind::Table(unsafe { self.table })
        } else {
            EntryKind::Block(unsafe { self.block })
        }
    }

    /// Whether this entry already provides the mapping `wanted` asks for.
    ///
    /// `wanted` is a leaf candidate expressed at this entry's level whose
    /// output address still points at the *requested* physical address;
    /// `offset_in_span` is the requested virtual address's offset within
    /// this entry's span. The entry is a superset when its attributes match
    /// and its output range puts the wanted physical address exactly at
    /// that offset — remapping would be a no-op.
    #[must_use]
    pub const fn is_superset_of(self, wanted: Self, offset_in_span: u64) -> bool {
        let have = self.into_bits();
        let want = wanted.into_bits();
        if want == 0 {
            // An unmap is covered only by an already-free slot.
            return have == 0;
        }
        if have == 0 {
            return false;
        }
        let block = unsafe { wanted.block };
        let oa = block.output_address().as_u64();
        if oa < offset_in_span {
            return false;
        }
        let realigned = block.with_output_address(PhysicalAddress::new(oa - offset_in_span));
        have == realigned.into_bits()
    }

    /// Build the leaf form of `attrs` for `level`: page tag at the last
    /// level, block tag above it.
    #[inline]
    #[must_use]
    pub const fn leaf(attrs: MemoryAttributes, phys: PhysicalAddress, level: Level) -> Self {
        Self::from_block(
            attrs
                .encode()
                .with_page(level.is_last())
                .with_output_address(phys),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{MemoryAttributes, MemoryType};

    #[test]
    fn classify_is_level_dependent() {
        let table = Entry::from_table(TableDescriptor::link(PhysicalAddress::new(0x4_3000), 7));
        assert!(matches!(table.classify(Level::new(1)), EntryKind::Table(d) if d.pool_slot() == 7));
        // The same word read at the last level is a page.
        assert!(matches!(table.classify(Level::LAST), EntryKind::Page(_)));

        let block = Entry::leaf(
            MemoryAttributes::normal(),
            PhysicalAddress::new(0x4000_0000),
            Level::new(1),
        );
        assert!(matches!(block.classify(Level::new(1)), EntryKind::Block(_)));
        assert!(matches!(Entry::free().classify(Level::new(2)), EntryKind::Free));
    }

    #[test]
    fn reserved_last_level_encoding_reads_as_free() {
        let block_shaped = Entry::leaf(
            MemoryAttributes::normal(),
            PhysicalAddress::new(0x20_0000),
            Level::new(2),
        );
        assert!(matches!(block_shaped.classify(Level::LAST), EntryKind::Free));
    }

    #[test]
    fn table_descriptor_round_trips() {
        let next = PhysicalAddress::new(0x0000_0000_8000_1000);
        let d = TableDescriptor::link(next, 42);
        assert!(d.valid());
        assert_eq!(d.next_table(), next);
        assert_eq!(d.pool_slot(), 42);
    }

    #[test]
    fn leaf_uses_the_page_tag_only_at_the_last_level() {
        let attrs = MemoryAttributes::normal();
        let pa = PhysicalAddress::new(0x8000_0000);
        let page = Entry::leaf(attrs, pa, Level::LAST);
        let block = Entry::leaf(attrs, pa, Level::new(2));
        assert!(matches!(page.classify(Level::LAST), EntryKind::Page(d) if d.page()));
        assert!(matches!(block.classify(Level::new(2)), EntryKind::Block(d) if !d.page()));
    }

    #[test]
    fn superset_realigns_the_wanted_output() {
        // Existing 2 MiB block at PA 0x4000_0000.
        let existing = Entry::leaf(
            MemoryAttributes::normal(),
            PhysicalAddress::new(0x4000_0000),
            Level::new(2),
        );
        // Wanted: one granule 0x3000 bytes into the same block, same attrs.
        let wanted = Entry::leaf(
            MemoryAttributes::normal(),
            PhysicalAddress::new(0x4000_3000),
            Level::new(2),
        );
        assert!(existing.is_superset_of(wanted, 0x3000));
        // Wrong offset: the physical address is not implied.
        assert!(!existing.is_superset_of(wanted, 0x2000));
        // Different attributes are never a superset.
        let device = Entry::leaf(
            MemoryAttributes::device().with_overwrite(true),
            PhysicalAddress::new(0x4000_3000),
            Level::new(2),
        );
        assert!(!existing.is_superset_of(device, 0x3000));
    }

    #[test]
    fn superset_of_an_unmap_is_an_empty_slot() {
        assert!(Entry::free().is_superset_of(Entry::free(), 0));
        let mapped = Entry::leaf(
            MemoryAttributes::normal(),
            PhysicalAddress::new(0x1000),
            Level::LAST,
        );
        assert!(!mapped.is_superset_of(Entry::free(), 0));
        assert!(!Entry::free().is_superset_of(mapped, 0));
    }

    #[test]
    fn attribute_bits_land_where_hardware_expects_them() {
        let desc = MemoryAttributes::normal()
            .with_read_write(true)
            .encode()
            .with_output_address(PhysicalAddress::new(0x8000_0000));
        let bits = desc.into_bits();
        assert_eq!(bits & 1, 1, "valid");
        assert_eq!((bits >> 2) & 0b111, u64::from(MemoryType::Normal.attr_index()));
        assert_eq!((bits >> 10) & 1, 1, "access flag");
        assert_eq!((bits >> 12) & 0xF_FFFF_FFFF, 0x8_0000, "output address");
    }
}
