//! # Memory Region Attributes
//!
//! The abstract attribute set a caller describes a region with, and its
//! encoding into descriptor bits. [`MemoryAttributes::encode`] is the single
//! policy point: execute-never hardening and shareability defaults are
//! decided here, not by callers.

use crate::descriptor::{BlockDescriptor, SH_INNER_SHAREABLE, SH_OUTER_SHAREABLE};
use xlat_registers::mair;

/// Memory type of a region, selecting a `MAIR_EL1` attribute slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryType {
    /// Strongly-ordered device memory (Device-nGnRnE): no gathering, no
    /// reordering, no early write acknowledgement.
    DeviceStrict,
    /// Device memory permitting early write acknowledgement (Device-nGnRE).
    DeviceRelaxed,
    /// Normal write-back cacheable memory.
    Normal,
    /// Normal non-cacheable memory (e.g. framebuffers, DMA pools).
    NormalNonCacheable,
}

impl MemoryType {
    /// The `MAIR_EL1` slot this type selects.
    #[inline]
    #[must_use]
    pub const fn attr_index(self) -> u8 {
        match self {
            Self::DeviceStrict => mair::DEVICE_STRICT_INDEX,
            Self::DeviceRelaxed => mair::DEVICE_RELAXED_INDEX,
            Self::Normal => mair::NORMAL_INDEX,
            Self::NormalNonCacheable => mair::NORMAL_NONCACHE_INDEX,
        }
    }

    /// Whether this is one of the device types.
    #[inline]
    #[must_use]
    pub const fn is_device(self) -> bool {
        matches!(self, Self::DeviceStrict | Self::DeviceRelaxed)
    }
}

/// Attribute set for one mapping request.
///
/// A plain value: produced by a caller (or the region orchestrator from a
/// named kernel section), consumed once by [`encode`](Self::encode), never
/// stored. The constructors start from the most restrictive useful defaults
/// — read-only, kernel-only, execute-never — and the `with_*` builders open
/// things up explicitly.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryAttributes {
    /// Memory type, selecting cacheability and ordering.
    pub memory_type: MemoryType,
    /// Writable (at every privilege level the region is visible to).
    pub read_write: bool,
    /// Mirror the mapping to unprivileged (EL0) access.
    pub user_mirror: bool,
    /// Privileged execute-never requested by the caller. [`encode`](Self::encode)
    /// may force this on regardless.
    pub execute_never: bool,
    /// Unprivileged execute-never requested by the caller.
    pub user_execute_never: bool,
    /// Output address is in the non-secure address space.
    pub non_secure: bool,
    /// Permit replacing existing descriptors in the requested range.
    pub allow_overwrite: bool,
}

impl MemoryAttributes {
    /// Normal cacheable memory: read-only, kernel-only, execute-never.
    #[must_use]
    pub const fn normal() -> Self {
        Self {
            memory_type: MemoryType::Normal,
            read_write: false,
            user_mirror: false,
            execute_never: true,
            user_execute_never: true,
            non_secure: false,
            allow_overwrite: false,
        }
    }

    /// Normal non-cacheable memory, otherwise like [`normal`](Self::normal).
    #[must_use]
    pub const fn normal_noncached() -> Self {
        Self {
            memory_type: MemoryType::NormalNonCacheable,
            ..Self::normal()
        }
    }

    /// Strongly-ordered device memory, read-write.
    #[must_use]
    pub const fn device() -> Self {
        Self {
            memory_type: MemoryType::DeviceStrict,
            read_write: true,
            ..Self::normal()
        }
    }

    /// Device memory with early write acknowledgement, read-write.
    #[must_use]
    pub const fn device_relaxed() -> Self {
        Self {
            memory_type: MemoryType::DeviceRelaxed,
            read_write: true,
            ..Self::normal()
        }
    }

    #[must_use]
    pub const fn with_read_write(mut self, rw: bool) -> Self {
        self.read_write = rw;
        self
    }

    #[must_use]
    pub const fn with_user_mirror(mut self, user: bool) -> Self {
        self.user_mirror = user;
        self
    }

    /// Allow privileged execution. Ignored for device memory and for
    /// writable normal memory (see [`encode`](Self::encode)).
    #[must_use]
    pub const fn with_executable(mut self) -> Self {
        self.execute_never = false;
        self
    }

    /// Allow unprivileged execution. Ignored for device memory and for
    /// mirrored mappings.
    #[must_use]
    pub const fn with_user_executable(mut self) -> Self {
        self.user_execute_never = false;
        self
    }

    #[must_use]
    pub const fn with_non_secure(mut self, ns: bool) -> Self {
        self.non_secure = ns;
        self
    }

    #[must_use]
    pub const fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    /// Encode into the descriptor template (attributes only, no output
    /// address, no type tag).
    ///
    /// Policy, applied in this order:
    ///
    /// 1. Device memory is always execute-never at both privilege levels
    ///    and outer-shareable, regardless of what the caller asked for.
    /// 2. Writable normal memory is privileged-execute-never (kernel W^X).
    /// 3. Normal memory mirrored to unprivileged access is additionally
    ///    unprivileged-execute-never.
    /// 4. Normal memory is inner-shareable; non-cacheable normal memory is
    ///    outer-shareable.
    ///
    /// The access flag is always set: this crate does not do access-flag
    /// faulting.
    #[must_use]
    pub const fn encode(self) -> BlockDescriptor {
        let device = self.memory_type.is_device();

        let mut pxn = self.execute_never;
        let mut uxn = self.user_execute_never;
        if device {
            pxn = true;
            uxn = true;
        }
        if !device && self.read_write {
            pxn = true;
        }
        if !device && self.user_mirror {
            uxn = true;
        }

        let shareability = if device || matches!(self.memory_type, MemoryType::NormalNonCacheable) {
            SH_OUTER_SHAREABLE
        } else {
            SH_INNER_SHAREABLE
        };

        BlockDescriptor::new()
            .with_valid(true)
            .with_attr_index(self.memory_type.attr_index())
            .with_non_secure(self.non_secure)
            .with_user(self.user_mirror)
            .with_read_only(!self.read_write)
            .with_shareability(shareability)
            .with_accessed(true)
            .with_pxn(pxn)
            .with_uxn(uxn)
    }
}
