//! # `SCTLR_EL1` — System Control Register
//!
//! Only the bits the enable sequence touches are modeled; everything else is
//! opaque padding so a read-modify-write preserves the reset-time RES1 bits.

use bitfield_struct::bitfield;

/// `SCTLR_EL1` — MMU and cache enables, remaining bits preserved as-is.
#[bitfield(u64)]
pub struct Sctlr {
    /// **M** (bit 0): stage-1 address translation enable.
    pub mmu: bool,

    /// **A** (bit 1): alignment-check enable.
    pub alignment_check: bool,

    /// **C** (bit 2): data/unified cache enable.
    pub data_cache: bool,

    /// **SA** (bit 3): SP-alignment check enable.
    pub sp_alignment_check: bool,

    /// (bits 4..12): untouched by this crate.
    #[bits(8)]
    __passthrough_4_11: u8,

    /// **I** (bit 12): instruction cache enable.
    pub instruction_cache: bool,

    /// (bits 13..64): untouched by this crate (several are RES1; always use
    /// read-modify-write).
    #[bits(51)]
    __passthrough_13_63: u64,
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for Sctlr {
    unsafe fn load_unsafe() -> Self {
        let bits: u64;
        unsafe {
            core::arch::asm!("mrs {}, sctlr_el1", out(reg) bits, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(bits)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::StoreRegisterUnsafe for Sctlr {
    unsafe fn store_unsafe(self) {
        let bits = self.into_bits();
        unsafe {
            core::arch::asm!("msr sctlr_el1, {}", in(reg) bits, options(nomem, nostack, preserves_flags));
        }
    }
}
