use crate::{Level, TABLE_ENTRIES};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// A thin wrapper around `u64` denoting an address translated through the
/// stage-1 tables. The interesting operation is [`table_index`], which
/// extracts the descriptor index a given [`Level`] consumes during a walk.
///
/// [`table_index`]: VirtualAddress::table_index
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The descriptor index this address selects at `level`.
    ///
    /// Returns a value in `0..512`.
    #[inline]
    #[must_use]
    pub const fn table_index(self, level: Level) -> usize {
        ((self.0 >> level.shift()) & (TABLE_ENTRIES as u64 - 1)) as usize
    }

    /// The offset of this address within one `level`-sized entry span.
    #[inline]
    #[must_use]
    pub const fn offset_in(self, level: Level) -> u64 {
        self.0 & (level.entry_size() - 1)
    }

    /// Whether the address is a multiple of `a` (`a` a power of two).
    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, a: u64) -> bool {
        self.0 & (a - 1) == 0
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
