//! # Mapping Engine
//!
//! The walker behind every mutation of the radix tree. A single entry
//! point, [`set_mapping`], covers both map and unmap: an unmap is the same
//! walk with an empty leaf template.
//!
//! ## Shape of the walk
//!
//! The outer loop consumes the virtual range strictly in increasing address
//! order, one chunk per iteration; every chunk restarts its descent at the
//! root. The inner descent either follows an existing table descriptor
//! (consuming no range), splits an entry that is too coarse for the request
//! and retries at the same address one level deeper, or writes the leaf and
//! consumes the level's span.
//!
//! Because the range is processed in order, a mid-range `Busy` or
//! `OutOfTables` leaves a well-defined mapped prefix and an untouched
//! suffix.
//!
//! ## Split and coalesce
//!
//! Splitting a block replicates it across all 512 child entries (with
//! per-entry output offsets) before the child is linked, so no address is
//! ever observed partially mapped. Clearing a leaf walks back up the parent
//! chain and returns every table that became empty to the pool. Tables
//! whose entries are all equal but *non-zero* are left split; only
//! all-free tables coalesce.

use crate::MapError;
use crate::descriptor::{BlockDescriptor, Entry, EntryKind, TableDescriptor};
use crate::pool::{TableHandle, TablePool};
use crate::table::EntryIndex;
use xlat_addresses::{GRANULE_SIZE, Level, PhysicalAddress, TABLE_ENTRIES, VirtualAddress};

/// Maximum radix-tree depth (levels `0..=3`).
const MAX_DEPTH: usize = 4;

/// One mapping or unmapping operation over a contiguous range.
pub(crate) struct MappingRequest {
    pub virt: VirtualAddress,
    /// Physical base; ignored when `template` is `None`.
    pub phys: PhysicalAddress,
    pub size: u64,
    /// Leaf attribute template from the codec; `None` unmaps the range.
    pub template: Option<BlockDescriptor>,
    /// When false, any occupied slot in the range reports [`MapError::Busy`].
    pub allow_overwrite: bool,
}

/// Parent slots traversed on the way down, shallowest first.
///
/// Kept so an unmap can coalesce emptied tables back up the chain without
/// re-walking from the root.
struct Path {
    slots: [(TableHandle, EntryIndex); MAX_DEPTH],
    len: usize,
}

impl Path {
    const fn new() -> Self {
        Self {
            slots: [(TableHandle::new(0), EntryIndex::new(0)); MAX_DEPTH],
            len: 0,
        }
    }

    fn push(&mut self, table: TableHandle, idx: EntryIndex) {
        assert!(self.len < MAX_DEPTH, "exceeded maximum walk depth");
        self.slots[self.len] = (table, idx);
        self.len += 1;
    }

    fn pop(&mut self) -> (TableHandle, EntryIndex) {
        debug_assert!(self.len > 0, "coalescing above the base level");
        self.len -= 1;
        self.slots[self.len]
    }
}

/// Apply `req` to the tree rooted at `root`.
///
/// The only mutating entry point. See the module docs for the walk
/// structure; failure semantics are prefix-mapped / suffix-untouched.
pub(crate) fn set_mapping<const N: usize>(
    pool: &mut TablePool<N>,
    root: TableHandle,
    base_level: Level,
    req: &MappingRequest,
) -> Result<(), MapError> {
    debug_assert!(req.virt.is_aligned_to(GRANULE_SIZE));
    debug_assert!(req.phys.is_aligned_to(GRANULE_SIZE));
    debug_assert!(req.size % GRANULE_SIZE == 0);

    let mut virt = req.virt.as_u64();
    let mut phys = req.phys.as_u64();
    let mut remaining = req.size;

    while remaining > 0 {
        let consumed = map_chunk(
            pool,
            root,
            base_level,
            virt,
            phys,
            remaining,
            req.template,
            req.allow_overwrite,
        )?;
        virt += consumed;
        phys += consumed;
        remaining -= consumed;
    }
    Ok(())
}

/// Process one chunk starting at `virt`: descend from the root, split where
/// the request is finer than the current level, and write or clear exactly
/// one leaf (or consume an already-satisfied span). Returns the number of
/// bytes consumed.
#[allow(clippy::too_many_arguments)]
fn map_chunk<const N: usize>(
    pool: &mut TablePool<N>,
    root: TableHandle,
    base_level: Level,
    virt: u64,
    phys: u64,
    remaining: u64,
    template: Option<BlockDescriptor>,
    allow_overwrite: bool,
) -> Result<u64, MapError> {
    let mut level = base_level;
    let mut table = root;
    let mut path = Path::new();

    loop {
        let idx = EntryIndex::of(VirtualAddress::new(virt), level);
        let entry = pool.table(table).get(idx);

        if let EntryKind::Table(desc) = entry.classify(level) {
            // Follow the existing child; no range is consumed.
            let child = TableHandle::new(desc.pool_slot());
            debug_assert!(pool.usage(child) != 0, "dangling table descriptor");
            path.push(table, idx);
            table = child;
            level = level.next();
            continue;
        }

        // The slot is free, a block, or a page.
        let span = level.entry_size();
        let offset = virt & (span - 1);

        if !entry.is_free() && !allow_overwrite {
            return Err(MapError::Busy);
        }

        // Idempotence: a slot that already provides this exact mapping is
        // left untouched and its span consumed. Boot-time region
        // declarations overlap routinely; rewriting them would churn tables
        // for no observable change.
        let wanted = match template {
            None => Some(Entry::free()),
            Some(t) if phys >= offset => Some(leaf_entry(t, phys, level)),
            Some(_) => None,
        };
        if let Some(wanted) = wanted {
            if entry.is_superset_of(wanted, offset) {
                return Ok(remaining.min(span - offset));
            }
        }

        // Finer-grained than this level can express — misaligned (virtually
        // or physically) or shorter than one entry: split, then retry the
        // same address one level deeper. Level 0 cannot hold blocks at all,
        // so a map request always descends past it.
        let misaligned = match template {
            Some(_) => level.as_usize() == 0 || (virt | phys) & (span - 1) != 0,
            None => offset != 0,
        };
        if misaligned || remaining < span {
            assert!(!level.is_last(), "granule-aligned request cannot split the last level");
            let child = split_entry(pool, table, idx, entry, level)?;
            path.push(table, idx);
            table = child;
            level = level.next();
            continue;
        }

        // Fits this level exactly: write the leaf (page at the last level,
        // block above it) or clear it, and keep the usage counts in step.
        let was_free = entry.is_free();
        match template {
            Some(t) => {
                pool.table_mut(table).set(idx, leaf_entry(t, phys, level));
                if was_free {
                    let _ = pool.adjust_usage(table, 1);
                }
            }
            None => {
                // A free slot was consumed by the superset check above.
                debug_assert!(!was_free);
                pool.table_mut(table).set_zero(idx);
                let _ = pool.adjust_usage(table, -1);
                coalesce(pool, &mut path, table, level, base_level);
            }
        }
        return Ok(span);
    }
}

/// Replace the (free or block) entry at `parent[idx]` with a link to a
/// freshly allocated child table and return the child.
///
/// A block is replicated across all 512 child entries first so the existing
/// mapping keeps translating across the split; the child's usage count then
/// reflects a fully populated table.
fn split_entry<const N: usize>(
    pool: &mut TablePool<N>,
    parent: TableHandle,
    idx: EntryIndex,
    entry: Entry,
    level: Level,
) -> Result<TableHandle, MapError> {
    let child = pool.allocate().ok_or(MapError::OutOfTables)?;
    let child_level = level.next();

    match entry.classify(level) {
        EntryKind::Free => {
            // First use of this parent slot.
            let _ = pool.adjust_usage(parent, 1);
        }
        EntryKind::Block(block) => {
            let child_span = child_level.entry_size();
            let base = block.output_address().as_u64();
            let child_table = pool.table_mut(child);
            for i in 0..TABLE_ENTRIES {
                let replica = block
                    .with_page(child_level.is_last())
                    .with_output_address(PhysicalAddress::new(base + i as u64 * child_span));
                #[allow(clippy::cast_possible_truncation)]
                child_table.set(EntryIndex::new(i as u16), Entry::from_block(replica));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let _ = pool.adjust_usage(child, TABLE_ENTRIES as i32);
        }
        EntryKind::Table(_) | EntryKind::Page(_) => {
            unreachable!("split target must be a free slot or a block")
        }
    }

    let link = TableDescriptor::link(pool.base_address(child), child.slot());
    pool.table_mut(parent).set(idx, Entry::from_table(link));
    Ok(child)
}

/// Walk back up the parent chain, returning every table that became empty
/// to the pool, until a non-empty ancestor or the base level is reached.
fn coalesce<const N: usize>(
    pool: &mut TablePool<N>,
    path: &mut Path,
    mut table: TableHandle,
    mut level: Level,
    base_level: Level,
) {
    while level != base_level && pool.is_unused(table) {
        let (parent, idx) = path.pop();
        pool.free(table);
        pool.table_mut(parent).set_zero(idx);
        let _ = pool.adjust_usage(parent, -1);
        table = parent;
        level = level.previous();
    }
}

/// Read-only walk to the leaf covering `virt`, if any.
pub(crate) fn lookup<const N: usize>(
    pool: &TablePool<N>,
    root: TableHandle,
    base_level: Level,
    virt: VirtualAddress,
) -> Option<(Level, BlockDescriptor)> {
    let mut level = base_level;
    let mut table = root;
    loop {
        let entry = pool.table(table).get(EntryIndex::of(virt, level));
        match entry.classify(level) {
            EntryKind::Free => return None,
            EntryKind::Table(desc) => {
                table = TableHandle::new(desc.pool_slot());
                level = level.next();
            }
            EntryKind::Block(leaf) | EntryKind::Page(leaf) => return Some((level, leaf)),
        }
    }
}

/// Resolve `virt` to its physical address, joining the in-span offset for
/// block-level leaves.
pub(crate) fn translate<const N: usize>(
    pool: &TablePool<N>,
    root: TableHandle,
    base_level: Level,
    virt: VirtualAddress,
) -> Option<PhysicalAddress> {
    let (level, leaf) = lookup(pool, root, base_level, virt)?;
    Some(leaf.output_address() + virt.offset_in(level))
}

/// The leaf template for `level`: page tag at the last level, block above.
fn leaf_entry(template: BlockDescriptor, phys: u64, level: Level) -> Entry {
    Entry::from_block(
        template
            .with_page(level.is_last())
            .with_output_address(PhysicalAddress::new(phys)),
    )
}
