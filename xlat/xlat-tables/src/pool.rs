//! # Translation Table Pool
//!
//! A fixed arena of [`TranslationTable`] slots with a parallel usage-count
//! array. The pool is the sole source of table storage; the mapping engine
//! borrows tables through it by [`TableHandle`] and never holds raw
//! pointers.
//!
//! ## Usage counting
//!
//! A slot's count is `0` when free. [`TablePool::allocate`] hands out a
//! zeroed table with count `1`, meaning "linked from a parent, holds no
//! entries yet". Every entry that transitions from free to filled —
//! block, page or child-table link alike — adds one; clearing an entry back
//! to free subtracts one. A table whose count has returned to `1` is
//! [`unused`](TablePool::is_unused) and may be coalesced away.
//!
//! The counter discipline is load-bearing for correctness, so
//! [`adjust_usage`](TablePool::adjust_usage) is the *only* mutator and is
//! crate-private; underflowing the count is a bug in the mapping engine and
//! aborts via assertion rather than being reported as an error.

use crate::table::TranslationTable;
use xlat_addresses::PhysicalAddress;

/// Handle to one pool slot.
///
/// Handles are small indices, never pointers; they are threaded through
/// every walk and stored in table descriptors' software bits, so a pool
/// index is never reconstructed from a table's address.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TableHandle(u8);

impl TableHandle {
    #[inline]
    #[must_use]
    pub(crate) const fn new(slot: u8) -> Self {
        Self(slot)
    }

    /// The raw slot value, as stored in a table descriptor's software bits.
    #[inline]
    #[must_use]
    pub const fn slot(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fixed-capacity arena of `N` translation tables.
///
/// `N` is capped at 256 so a slot always fits the 8-bit software tag in a
/// table descriptor. Out-of-range handles fault on the array bounds check —
/// a handle forged or kept across a free is a caller bug, not an error
/// condition.
pub struct TablePool<const N: usize> {
    tables: [TranslationTable; N],
    use_count: [u16; N],
}

impl<const N: usize> TablePool<N> {
    /// An empty pool; every slot free.
    #[must_use]
    pub fn new() -> Self {
        const {
            assert!(N > 0, "pool needs at least a root table");
            assert!(N <= 256, "pool slot must fit the descriptor software tag");
        }
        Self {
            tables: core::array::from_fn(|_| TranslationTable::zeroed()),
            use_count: [0; N],
        }
    }

    /// Claim a free slot: returns a zeroed table with usage count 1, or
    /// `None` when the pool is exhausted.
    ///
    /// Exhaustion is a hard failure for the caller — an interrupted mapping
    /// operation leaves the address space inconsistent — but it is reported,
    /// not asserted, so post-boot callers can surface it.
    #[allow(clippy::cast_possible_truncation)]
    pub fn allocate(&mut self) -> Option<TableHandle> {
        let slot = self.use_count.iter().position(|&c| c == 0)?;
        self.tables[slot] = TranslationTable::zeroed();
        self.use_count[slot] = 1;
        log::trace!("table pool: allocated slot {slot}");
        Some(TableHandle::new(slot as u8))
    }

    /// Return a table to the pool.
    ///
    /// ### Panics
    /// If the table still holds live entries (count != 1). Freeing a live
    /// table is a programming error in the engine, not a recoverable
    /// condition.
    pub fn free(&mut self, handle: TableHandle) {
        assert_eq!(
            self.use_count[handle.index()],
            1,
            "freeing a table with live entries"
        );
        self.use_count[handle.index()] = 0;
        log::trace!("table pool: freed slot {}", handle.slot());
    }

    /// Apply `delta` to a table's usage count and return the new value.
    ///
    /// The only mutator of the count. Dropping below 1 while the table is
    /// allocated is a fatal invariant violation.
    pub(crate) fn adjust_usage(&mut self, handle: TableHandle, delta: i32) -> u16 {
        let count = i32::from(self.use_count[handle.index()]);
        assert!(count >= 1, "usage adjustment on a free slot");
        let next = count + delta;
        assert!(next >= 1, "table usage count underflow");
        assert!(next <= i32::from(u16::MAX), "table usage count overflow");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let next = next as u16;
        self.use_count[handle.index()] = next;
        next
    }

    /// Whether the table is allocated but holds no entries (count == 1).
    #[inline]
    #[must_use]
    pub fn is_unused(&self, handle: TableHandle) -> bool {
        self.use_count[handle.index()] == 1
    }

    #[inline]
    pub(crate) fn usage(&self, handle: TableHandle) -> u16 {
        self.use_count[handle.index()]
    }

    /// Number of slots currently allocated.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.use_count.iter().filter(|&&c| c != 0).count()
    }

    /// Total slots in the pool.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Borrow the table behind `handle`.
    #[inline]
    pub(crate) fn table(&self, handle: TableHandle) -> &TranslationTable {
        debug_assert!(self.use_count[handle.index()] != 0, "stale table handle");
        &self.tables[handle.index()]
    }

    /// Mutably borrow the table behind `handle`.
    #[inline]
    pub(crate) fn table_mut(&mut self, handle: TableHandle) -> &mut TranslationTable {
        debug_assert!(self.use_count[handle.index()] != 0, "stale table handle");
        &mut self.tables[handle.index()]
    }

    /// Physical base address of the table behind `handle`, as stored into
    /// parent table descriptors and `TTBR0`.
    ///
    /// The pool owns the storage, so while translation is off this is the
    /// table's location in the kernel image / RAM; systems that relocate
    /// must identity-map or offset-map the pool accordingly.
    #[inline]
    #[must_use]
    pub fn base_address(&self, handle: TableHandle) -> PhysicalAddress {
        PhysicalAddress::from_ptr(core::ptr::from_ref(&self.tables[handle.index()]))
    }
}

impl<const N: usize> Default for TablePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xlat_addresses::GRANULE_SIZE;

    #[test]
    fn allocate_initializes_and_counts() {
        let mut pool = TablePool::<4>::new();
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.capacity(), 4);

        let h = pool.allocate().unwrap();
        assert_eq!(pool.usage(h), 1);
        assert!(pool.is_unused(h));
        assert_eq!(pool.allocated(), 1);
        assert!(pool.base_address(h).is_aligned_to(GRANULE_SIZE));
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut pool = TablePool::<2>::new();
        assert!(pool.allocate().is_some());
        assert!(pool.allocate().is_some());
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn free_recycles_slots() {
        let mut pool = TablePool::<2>::new();
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        pool.free(a);
        assert_eq!(pool.allocated(), 1);
        // The freed slot is handed out again.
        assert_eq!(pool.allocate().unwrap(), a);
    }

    #[test]
    fn usage_adjustments_round_trip() {
        let mut pool = TablePool::<2>::new();
        let h = pool.allocate().unwrap();
        assert_eq!(pool.adjust_usage(h, 3), 4);
        assert!(!pool.is_unused(h));
        assert_eq!(pool.adjust_usage(h, -3), 1);
        assert!(pool.is_unused(h));
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn usage_underflow_asserts() {
        let mut pool = TablePool::<2>::new();
        let h = pool.allocate().unwrap();
        let _ = pool.adjust_usage(h, -1);
    }

    #[test]
    #[should_panic(expected = "live entries")]
    fn freeing_a_live_table_asserts() {
        let mut pool = TablePool::<2>::new();
        let h = pool.allocate().unwrap();
        let _ = pool.adjust_usage(h, 1);
        pool.free(h);
    }

    #[test]
    fn distinct_tables_have_distinct_granule_aligned_bases() {
        let mut pool = TablePool::<3>::new();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let delta = pool.base_address(b).as_u64() - pool.base_address(a).as_u64();
        assert_eq!(delta, GRANULE_SIZE);
    }
}
