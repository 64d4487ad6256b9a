//! # AArch64 Stage-1 Translation Table Manager
//!
//! Builds, mutates and tears down the radix tree of stage-1 descriptors
//! that maps virtual to physical addresses under a 4 KiB granule.
//!
//! ## What you get
//! - A fixed [`TablePool`] of translation tables with per-table usage
//!   counts — the sole source of table storage.
//! - A descriptor codec: [`MemoryAttributes`] in, hardware
//!   [`BlockDescriptor`] bits out, with execute-never and shareability
//!   policy applied in one place.
//! - A mapping engine that splits oversized entries on demand and
//!   coalesces emptied tables back into the pool, behind
//!   [`AddressSpace::map_region`] / [`AddressSpace::unmap_region`].
//! - Boot-time orchestration ([`init_address_space`]) and the
//!   MAIR/TCR/TTBR0 values ([`AddressSpace::translation_config`]) that make
//!   the tree live.
//!
//! ## AArch64 Virtual Address → Physical Address Walk
//!
//! A 48-bit virtual address divides into four 9-bit table indices plus the
//! page offset:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L0   |  L1   |  L2   |  L3   | Offset |
//! ```
//!
//! Each level is a 512-entry table of 64-bit descriptors. Narrower address
//! spaces start deeper: the *base level* follows the configured VA width.
//!
//! | Level | Leaf form | Maps |
//! |:------|:----------|:-----|
//! | 0 | — (tables only) | 512 GiB per entry |
//! | 1 | block | 1 GiB |
//! | 2 | block | 2 MiB |
//! | 3 | page | 4 KiB |
//!
//! A *table* descriptor continues the walk; a *block* or *page* descriptor
//! terminates it and supplies the output address plus permissions. The two
//! leaf forms share one layout and differ only in the type tag, which is
//! why the codec classifies by `(bits, level)` rather than bits alone.
//!
//! ## Correctness properties
//!
//! The engine never leaves an address partially mapped (splits replicate
//! the old block before linking), never frees a table still referenced
//! (usage counts, assertion-checked), and processes ranges in increasing
//! address order so failures leave a well-defined prefix mapped.
//!
//! ## Concurrency
//!
//! One mapping call is one critical section. Nothing here suspends;
//! [`SharedAddressSpace`] adds the coarse lock for multi-core use.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
pub mod attributes;
pub mod descriptor;
mod mapping;
pub mod pool;
pub mod region;
pub mod sync;
pub mod table;

pub use crate::address_space::{AddressSpace, TranslationConfig};
pub use crate::attributes::{MemoryAttributes, MemoryType};
pub use crate::descriptor::{BlockDescriptor, Entry, EntryKind, TableDescriptor};
pub use crate::pool::{TableHandle, TablePool};
pub use crate::region::{KernelImageLayout, PlatformRegion, Section, init_address_space};
pub use crate::sync::{SharedAddressSpace, SpinLock};
pub use crate::table::{EntryIndex, TranslationTable};

/// Errors reported by mapping operations.
///
/// Only resource exhaustion and overwrite-policy violations are *reported*;
/// invariant violations (usage-count underflow, walking past the last
/// level, stale handles, freeing a live table) abort via assertion, because
/// continuing with a corrupted tree is categorically worse than halting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// A slot in the requested range is occupied and the request did not
    /// allow overwriting.
    #[error("address range is already mapped")]
    Busy,

    /// The table pool has no free slot to back a required table.
    #[error("translation table pool exhausted")]
    OutOfTables,
}
