//! # Address Space
//!
//! The public face of one translation tree: owns the [`TablePool`] and the
//! root table, validates and encodes region requests, and hands the
//! hardware the register values that make the tree live.
//!
//! ## Design
//!
//! - The pool and the tables it stores are one resource with one owner;
//!   there is no global state. Wrap an `AddressSpace` in
//!   [`SharedAddressSpace`](crate::sync::SharedAddressSpace) once multiple
//!   cores can issue mapping calls.
//! - Alignment of region endpoints is a *caller contract*, enforced with
//!   assertions: a misaligned base or size is a bug in the caller, not a
//!   runtime condition to report.
//!
//! ## Safety
//!
//! Mutating mappings that are live under the MMU requires TLB maintenance;
//! [`enable`](AddressSpace::enable) performs the full invalidation for the
//! initial switch-on, later mutations are the caller's responsibility.

use crate::MapError;
use crate::attributes::MemoryAttributes;
use crate::descriptor::BlockDescriptor;
use crate::mapping::{self, MappingRequest};
use crate::pool::{TableHandle, TablePool};
use xlat_addresses::{GRANULE_SIZE, Level, PhysicalAddress, VirtualAddress, is_granule_aligned};
use xlat_registers::mair::Mair;
use xlat_registers::tcr::Tcr;
use xlat_registers::ttbr::Ttbr0;

/// The register values that put an [`AddressSpace`] into effect.
///
/// Pure data; building it has no side effects, which keeps the whole
/// configuration testable off-target.
#[derive(Copy, Clone, Debug)]
pub struct TranslationConfig {
    pub mair: Mair,
    pub tcr: Tcr,
    pub ttbr0: Ttbr0,
}

/// One stage-1 address space: a pool of `N` tables and the tree rooted in
/// one of them.
///
/// The root is allocated at construction and never freed; every other
/// table's lifetime is managed by the mapping engine's split and coalesce
/// paths.
pub struct AddressSpace<const N: usize> {
    pool: TablePool<N>,
    root: TableHandle,
    base_level: Level,
    va_bits: u32,
}

impl<const N: usize> AddressSpace<N> {
    /// An empty address space translating `va_bits` bits of VA.
    ///
    /// ### Panics
    /// If `va_bits` is outside `25..=48`.
    #[must_use]
    pub fn new(va_bits: u32) -> Self {
        let base_level = Level::base_for(va_bits);
        let mut pool = TablePool::new();
        let root = pool
            .allocate()
            .expect("fresh table pool must yield a root table");
        Self {
            pool,
            root,
            base_level,
            va_bits,
        }
    }

    /// Map `size` bytes at `virt` onto `phys` with `attrs`.
    ///
    /// `name` only feeds the log line. Overwrite policy and the descriptor
    /// encoding come from `attrs`.
    ///
    /// ### Panics
    /// If `phys`, `virt` or `size` is not granule-aligned (caller bug).
    ///
    /// ### Errors
    /// - [`MapError::Busy`]: an occupied slot in the range, overwrite not
    ///   allowed. The range before the collision is mapped, the rest is
    ///   untouched.
    /// - [`MapError::OutOfTables`]: the pool could not back a split.
    pub fn map_region(
        &mut self,
        name: &str,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        size: u64,
        attrs: MemoryAttributes,
    ) -> Result<(), MapError> {
        assert!(
            phys.is_aligned_to(GRANULE_SIZE),
            "physical base of region `{name}` is not granule-aligned"
        );
        assert!(
            virt.is_aligned_to(GRANULE_SIZE),
            "virtual base of region `{name}` is not granule-aligned"
        );
        assert!(
            is_granule_aligned(size),
            "size of region `{name}` is not a granule multiple"
        );
        log::debug!("map region `{name}`: {virt} -> {phys}, {size} bytes");

        mapping::set_mapping(
            &mut self.pool,
            self.root,
            self.base_level,
            &MappingRequest {
                virt,
                phys,
                size,
                template: Some(attrs.encode()),
                allow_overwrite: attrs.allow_overwrite,
            },
        )
        .inspect_err(|error| log::error!("mapping region `{name}` failed: {error}"))
    }

    /// Remove every mapping in `[virt, virt + size)`, coalescing tables
    /// that become empty.
    ///
    /// Unmapping an already-unmapped range is a no-op. Mutations to a live
    /// tree require TLB invalidation afterwards.
    ///
    /// ### Panics
    /// If `virt` or `size` is not granule-aligned (caller bug).
    ///
    /// ### Errors
    /// - [`MapError::OutOfTables`]: unmapping a sub-range of a block needs
    ///   a split, and the pool could not back it.
    pub fn unmap_region(&mut self, virt: VirtualAddress, size: u64) -> Result<(), MapError> {
        assert!(
            virt.is_aligned_to(GRANULE_SIZE),
            "virtual base to unmap is not granule-aligned"
        );
        assert!(
            is_granule_aligned(size),
            "size to unmap is not a granule multiple"
        );
        log::debug!("unmap {size} bytes at {virt}");

        mapping::set_mapping(
            &mut self.pool,
            self.root,
            self.base_level,
            &MappingRequest {
                virt,
                phys: PhysicalAddress::zero(),
                size,
                template: None,
                allow_overwrite: true,
            },
        )
        .inspect_err(|error| log::error!("unmap at {virt} failed: {error}"))
    }

    /// Resolve `virt` to its physical address, if mapped.
    ///
    /// Handles block-level leaves by joining the in-span offset.
    #[must_use]
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        mapping::translate(&self.pool, self.root, self.base_level, virt)
    }

    /// The level and descriptor of the leaf covering `virt`, if any.
    pub(crate) fn leaf_at(&self, virt: VirtualAddress) -> Option<(Level, BlockDescriptor)> {
        mapping::lookup(&self.pool, self.root, self.base_level, virt)
    }

    /// Number of tables currently allocated, root included.
    #[must_use]
    pub fn allocated_tables(&self) -> usize {
        self.pool.allocated()
    }

    /// Total table slots in the pool.
    #[must_use]
    pub const fn table_capacity(&self) -> usize {
        N
    }

    /// Physical base of the root table, as loaded into `TTBR0`.
    #[must_use]
    pub fn root_address(&self) -> PhysicalAddress {
        self.pool.base_address(self.root)
    }

    /// Configured VA width in bits.
    #[must_use]
    pub const fn va_bits(&self) -> u32 {
        self.va_bits
    }

    /// The level walks start at for this VA width.
    #[must_use]
    pub const fn base_level(&self) -> Level {
        self.base_level
    }

    /// The register values that make this address space live.
    #[must_use]
    pub fn translation_config(&self) -> TranslationConfig {
        TranslationConfig {
            mair: Mair::kernel_default(),
            tcr: Tcr::kernel_default(self.va_bits),
            ttbr0: Ttbr0::from_root(self.root_address()),
        }
    }

    /// Program `MAIR_EL1`/`TCR_EL1`/`TTBR0_EL1`, invalidate the TLB and
    /// enable stage-1 translation plus caches.
    ///
    /// # Safety
    /// - Must run at EL1 with translation currently off (or with this very
    ///   tree already live).
    /// - The tree must map the currently executing code and the tables
    ///   themselves at the addresses execution will continue from, or the
    ///   next instruction fetch faults.
    #[cfg(target_arch = "aarch64")]
    pub unsafe fn enable(&self) {
        use xlat_registers::barrier;
        use xlat_registers::sctlr::Sctlr;
        use xlat_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

        let config = self.translation_config();
        unsafe {
            config.mair.store_unsafe();
            config.tcr.store_unsafe();
            config.ttbr0.store_unsafe();
            barrier::dsb_sy();
            barrier::isb();
            barrier::invalidate_all();

            let sctlr = Sctlr::load_unsafe()
                .with_mmu(true)
                .with_data_cache(true)
                .with_instruction_cache(true);
            sctlr.store_unsafe();
            barrier::isb();
        }
        log::info!("stage-1 translation enabled, root at {}", self.root_address());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::MemoryType;
    use crate::descriptor::SH_OUTER_SHAREABLE;
    use xlat_addresses::GRANULE_SIZE;

    const KIB_4: u64 = GRANULE_SIZE;
    const MIB_2: u64 = 2 * 1024 * 1024;

    fn normal_rw() -> MemoryAttributes {
        MemoryAttributes::normal().with_read_write(true)
    }

    #[test]
    fn three_pages_map_contiguously() {
        let mut space = AddressSpace::<8>::new(48);
        let phys = PhysicalAddress::new(0x8000_0000);
        let virt = VirtualAddress::new(0x1000);
        space
            .map_region("ram", phys, virt, 3 * KIB_4, normal_rw())
            .unwrap();

        for i in 0..3u64 {
            assert_eq!(
                space.translate(virt + i * KIB_4),
                Some(phys + i * KIB_4),
                "page {i}"
            );
        }
        // Just outside the range on both sides.
        assert_eq!(space.translate(VirtualAddress::new(0)), None);
        assert_eq!(space.translate(virt + 3 * KIB_4), None);

        let (level, leaf) = space.leaf_at(virt).unwrap();
        assert_eq!(level, Level::LAST);
        assert!(leaf.pxn(), "writable normal memory is execute-never");
        assert!(!leaf.read_only());
    }

    #[test]
    fn aligned_device_region_becomes_one_block() {
        let mut space = AddressSpace::<8>::new(48);
        let phys = PhysicalAddress::new(0x0900_0000);
        let virt = VirtualAddress::new(0x4020_0000);
        space
            .map_region("mmio", phys, virt, MIB_2, MemoryAttributes::device())
            .unwrap();

        let (level, leaf) = space.leaf_at(virt).unwrap();
        assert_eq!(level, Level::new(2), "one 2 MiB block, no deeper table");
        assert!(leaf.pxn());
        assert!(leaf.uxn());
        assert_eq!(leaf.shareability(), SH_OUTER_SHAREABLE);
        // Root (L0), its L1 child, and the L2 table holding the block.
        assert_eq!(space.allocated_tables(), 3);
        // Offsets within the block resolve through the single leaf.
        assert_eq!(
            space.translate(virt + 0x1234),
            Some(phys + 0x1234)
        );
    }

    #[test]
    fn remapping_a_granule_splits_the_block() {
        let mut space = AddressSpace::<8>::new(48);
        let phys = PhysicalAddress::new(0x4000_0000);
        let virt = VirtualAddress::new(0x4000_0000);
        space
            .map_region("heap", phys, virt, MIB_2, normal_rw())
            .unwrap();
        let before = space.allocated_tables();

        let sub = virt + 0x3000;
        space
            .map_region(
                "mmio",
                PhysicalAddress::new(0x0900_0000),
                sub,
                KIB_4,
                MemoryAttributes::device().with_overwrite(true),
            )
            .unwrap();

        // One new table backs the split; the differing granule is a page.
        assert_eq!(space.allocated_tables(), before + 1);
        let (level, leaf) = space.leaf_at(sub).unwrap();
        assert_eq!(level, Level::LAST);
        assert_eq!(
            leaf.attr_index(),
            MemoryType::DeviceStrict.attr_index()
        );
        assert_eq!(space.translate(sub), Some(PhysicalAddress::new(0x0900_0000)));

        // The other 511 entries still decode to the original mapping.
        for offset in [0, 0x1000, 0x2000, 0x4000, MIB_2 - 0x1000] {
            assert_eq!(space.translate(virt + offset), Some(phys + offset), "offset {offset:#x}");
            let (level, leaf) = space.leaf_at(virt + offset).unwrap();
            assert_eq!(level, Level::LAST);
            assert_eq!(leaf.attr_index(), MemoryType::Normal.attr_index());
        }
    }

    #[test]
    fn uniform_split_tables_are_not_recollapsed() {
        let mut space = AddressSpace::<8>::new(48);
        let phys = PhysicalAddress::new(0x4000_0000);
        let virt = VirtualAddress::new(0x4000_0000);
        space
            .map_region("heap", phys, virt, MIB_2, normal_rw())
            .unwrap();
        let sub = virt + 0x3000;
        space
            .map_region(
                "mmio",
                PhysicalAddress::new(0x0900_0000),
                sub,
                KIB_4,
                MemoryAttributes::device().with_overwrite(true),
            )
            .unwrap();
        let split_tables = space.allocated_tables();

        // Undo the divergence: first unmap, then restore the original
        // granule so all 512 entries are uniform again.
        space.unmap_region(sub, KIB_4).unwrap();
        assert_eq!(space.translate(sub), None);
        assert_eq!(
            space.allocated_tables(),
            split_tables,
            "a table with live entries must survive"
        );
        space
            .map_region(
                "heap",
                phys + 0x3000,
                sub,
                KIB_4,
                normal_rw().with_overwrite(true),
            )
            .unwrap();

        // Uniform-but-nonzero tables stay split; only all-free tables are
        // coalesced.
        assert_eq!(space.allocated_tables(), split_tables);
        let (level, _) = space.leaf_at(virt).unwrap();
        assert_eq!(level, Level::LAST);
        for offset in [0, 0x3000, MIB_2 - 0x1000] {
            assert_eq!(space.translate(virt + offset), Some(phys + offset));
        }
    }

    #[test]
    fn remapping_identically_is_a_no_op() {
        let mut space = AddressSpace::<8>::new(48);
        let phys = PhysicalAddress::new(0x8000_0000);
        let virt = VirtualAddress::new(0x4000_0000);
        let attrs = normal_rw().with_overwrite(true);

        space.map_region("a", phys, virt, 4 * KIB_4, attrs).unwrap();
        let tables = space.allocated_tables();
        let leaves: Vec<u64> = (0..4u64)
            .map(|i| space.leaf_at(virt + i * KIB_4).unwrap().1.into_bits())
            .collect();

        space.map_region("a", phys, virt, 4 * KIB_4, attrs).unwrap();
        assert_eq!(space.allocated_tables(), tables);
        for (i, bits) in leaves.iter().enumerate() {
            assert_eq!(
                space.leaf_at(virt + i as u64 * KIB_4).unwrap().1.into_bits(),
                *bits
            );
        }
    }

    #[test]
    fn unmap_returns_every_split_table_to_the_pool() {
        let mut space = AddressSpace::<8>::new(48);
        let baseline = space.allocated_tables();
        assert_eq!(baseline, 1, "only the root");

        let virt = VirtualAddress::new(0x4000_0000);
        space
            .map_region(
                "scratch",
                PhysicalAddress::new(0x8000_0000),
                virt,
                3 * KIB_4,
                normal_rw(),
            )
            .unwrap();
        assert!(space.allocated_tables() > baseline);

        space.unmap_region(virt, 3 * KIB_4).unwrap();
        assert_eq!(space.allocated_tables(), baseline, "no leaked tables");
        assert_eq!(space.translate(virt), None);
    }

    #[test]
    fn occupied_ranges_report_busy_without_overwrite() {
        let mut space = AddressSpace::<8>::new(48);
        let virt = VirtualAddress::new(0x1000);
        space
            .map_region(
                "a",
                PhysicalAddress::new(0x8000_0000),
                virt,
                KIB_4,
                normal_rw(),
            )
            .unwrap();
        let before = space.leaf_at(virt).unwrap().1.into_bits();

        // A different mapping collides…
        assert_eq!(
            space.map_region(
                "b",
                PhysicalAddress::new(0x9000_0000),
                virt,
                KIB_4,
                normal_rw()
            ),
            Err(MapError::Busy)
        );
        // …and so does an identical one: overwrite policy precedes the
        // idempotence shortcut.
        assert_eq!(
            space.map_region(
                "a",
                PhysicalAddress::new(0x8000_0000),
                virt,
                KIB_4,
                normal_rw()
            ),
            Err(MapError::Busy)
        );
        assert_eq!(space.leaf_at(virt).unwrap().1.into_bits(), before);
    }

    #[test]
    fn busy_midway_leaves_prefix_mapped_and_suffix_untouched() {
        let mut space = AddressSpace::<8>::new(48);
        let base = VirtualAddress::new(0x10_0000);
        let second = base + KIB_4;

        // Occupy the middle page first.
        space
            .map_region(
                "existing",
                PhysicalAddress::new(0x9000_0000),
                second,
                KIB_4,
                MemoryAttributes::device(),
            )
            .unwrap();

        // A three-page request collides on its second page.
        let phys = PhysicalAddress::new(0x8000_0000);
        assert_eq!(
            space.map_region("new", phys, base, 3 * KIB_4, normal_rw()),
            Err(MapError::Busy)
        );

        // Prefix mapped, collision preserved, suffix untouched.
        assert_eq!(space.translate(base), Some(phys));
        assert_eq!(
            space.translate(second),
            Some(PhysicalAddress::new(0x9000_0000))
        );
        assert_eq!(
            space.leaf_at(second).unwrap().1.attr_index(),
            MemoryType::DeviceStrict.attr_index()
        );
        assert_eq!(space.translate(base + 2 * KIB_4), None);
    }

    #[test]
    fn map_fails_when_the_pool_cannot_back_the_walk() {
        // Two slots: root plus one intermediate; a 48-bit walk to the last
        // level needs three intermediates.
        let mut space = AddressSpace::<2>::new(48);
        assert_eq!(
            space.map_region(
                "too-deep",
                PhysicalAddress::new(0x8000_0000),
                VirtualAddress::new(0x1000),
                KIB_4,
                normal_rw()
            ),
            Err(MapError::OutOfTables)
        );
    }

    #[test]
    fn unmap_inside_a_block_can_exhaust_the_pool() {
        // 39-bit VA: the root sits at level 1, so a 2 MiB block needs just
        // one more table and fills the two-slot pool.
        let mut space = AddressSpace::<2>::new(39);
        let virt = VirtualAddress::new(0x4000_0000);
        let phys = PhysicalAddress::new(0x4000_0000);
        space
            .map_region("blk", phys, virt, MIB_2, normal_rw())
            .unwrap();
        assert_eq!(space.allocated_tables(), 2);

        // Splitting off one granule needs a third table.
        assert_eq!(
            space.unmap_region(virt, KIB_4),
            Err(MapError::OutOfTables)
        );
        // The block still translates.
        assert_eq!(space.translate(virt + 0x1000), Some(phys + 0x1000));
    }

    #[test]
    fn base_level_follows_the_va_width() {
        assert_eq!(AddressSpace::<2>::new(48).base_level(), Level::new(0));
        assert_eq!(AddressSpace::<2>::new(39).base_level(), Level::new(1));
    }

    #[test]
    fn translation_config_describes_this_space() {
        let space = AddressSpace::<2>::new(48);
        let config = space.translation_config();
        assert_eq!(config.ttbr0.root(), space.root_address());
        assert_eq!(config.tcr.t0sz(), 16);
        assert_eq!(config.mair.into_bits(), Mair::kernel_default().into_bits());
    }

    #[test]
    #[should_panic(expected = "physical base")]
    fn misaligned_phys_asserts() {
        let mut space = AddressSpace::<2>::new(48);
        let _ = space.map_region(
            "bad",
            PhysicalAddress::new(0x8000_0800),
            VirtualAddress::new(0x1000),
            KIB_4,
            normal_rw(),
        );
    }

    #[test]
    #[should_panic(expected = "virtual base")]
    fn misaligned_virt_asserts() {
        let mut space = AddressSpace::<2>::new(48);
        let _ = space.map_region(
            "bad",
            PhysicalAddress::new(0x8000_0000),
            VirtualAddress::new(0x1800),
            KIB_4,
            normal_rw(),
        );
    }

    #[test]
    #[should_panic(expected = "size of region")]
    fn misaligned_size_asserts() {
        let mut space = AddressSpace::<2>::new(48);
        let _ = space.map_region(
            "bad",
            PhysicalAddress::new(0x8000_0000),
            VirtualAddress::new(0x1000),
            KIB_4 / 2,
            normal_rw(),
        );
    }
}
