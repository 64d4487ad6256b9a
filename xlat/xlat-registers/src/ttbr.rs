//! # `TTBR0_EL1` — Translation Table Base Register 0
//!
//! Physical base of the root translation table plus the ASID. The base must
//! be granule-aligned; bit 0 doubles as the common-not-private hint on
//! ARMv8.2+ parts, which this crate leaves clear.

use bitfield_struct::bitfield;
use xlat_addresses::{GRANULE_SIZE, PhysicalAddress};

/// `TTBR0_EL1` — root table base and ASID.
#[bitfield(u64)]
pub struct Ttbr0 {
    /// **CnP** (bit 0): common-not-private.
    pub cnp: bool,

    /// **BADDR** (bits 1..48): root table physical address bits `[47:1]`.
    #[bits(47)]
    baddr_47_1: u64,

    /// **ASID** (bits 48..64): address-space identifier.
    #[bits(16)]
    pub asid: u16,
}

impl Ttbr0 {
    /// Build a `TTBR0` value pointing at `root` with ASID 0.
    ///
    /// ### Debug assertions
    /// - `root` must be granule-aligned.
    #[must_use]
    pub const fn from_root(root: PhysicalAddress) -> Self {
        debug_assert!(root.is_aligned_to(GRANULE_SIZE));
        Self::new().with_baddr_47_1(root.as_u64() >> 1)
    }

    /// The root table physical address stored in this value.
    #[must_use]
    pub const fn root(self) -> PhysicalAddress {
        PhysicalAddress::new(self.baddr_47_1() << 1)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for Ttbr0 {
    unsafe fn load_unsafe() -> Self {
        let bits: u64;
        unsafe {
            core::arch::asm!("mrs {}, ttbr0_el1", out(reg) bits, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(bits)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::StoreRegisterUnsafe for Ttbr0 {
    unsafe fn store_unsafe(self) {
        let bits = self.into_bits();
        unsafe {
            core::arch::asm!("msr ttbr0_el1, {}", in(reg) bits, options(nomem, nostack, preserves_flags));
        }
    }
}
