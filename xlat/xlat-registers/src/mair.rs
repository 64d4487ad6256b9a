//! # `MAIR_EL1` — Memory Attribute Indirection Register
//!
//! Eight 8-bit attribute encodings; a block or page descriptor selects one
//! through its 3-bit `AttrIndx` field. The slot assignment below is fixed
//! for this crate family — the descriptor codec and [`Mair::kernel_default`]
//! must agree on it.

use bitfield_struct::bitfield;

/// `AttrIndx` for strongly-ordered device memory (Device-nGnRnE).
pub const DEVICE_STRICT_INDEX: u8 = 0;

/// `AttrIndx` for device memory that permits early write acknowledgement
/// (Device-nGnRE).
pub const DEVICE_RELAXED_INDEX: u8 = 1;

/// `AttrIndx` for normal write-back cacheable memory.
pub const NORMAL_INDEX: u8 = 2;

/// `AttrIndx` for normal non-cacheable memory.
pub const NORMAL_NONCACHE_INDEX: u8 = 3;

/// Attribute encoding: Device-nGnRnE.
pub const ATTR_DEVICE_NGNRNE: u8 = 0x00;

/// Attribute encoding: Device-nGnRE.
pub const ATTR_DEVICE_NGNRE: u8 = 0x04;

/// Attribute encoding: normal memory, inner+outer write-back non-transient,
/// read/write-allocate.
pub const ATTR_NORMAL_WB: u8 = 0xFF;

/// Attribute encoding: normal memory, inner+outer non-cacheable.
pub const ATTR_NORMAL_NC: u8 = 0x44;

/// `MAIR_EL1` — eight memory-attribute slots, 8 bits each.
#[bitfield(u64)]
pub struct Mair {
    /// Attribute slot 0.
    #[bits(8)]
    pub attr0: u8,
    /// Attribute slot 1.
    #[bits(8)]
    pub attr1: u8,
    /// Attribute slot 2.
    #[bits(8)]
    pub attr2: u8,
    /// Attribute slot 3.
    #[bits(8)]
    pub attr3: u8,
    /// Attribute slot 4.
    #[bits(8)]
    pub attr4: u8,
    /// Attribute slot 5.
    #[bits(8)]
    pub attr5: u8,
    /// Attribute slot 6.
    #[bits(8)]
    pub attr6: u8,
    /// Attribute slot 7.
    #[bits(8)]
    pub attr7: u8,
}

impl Mair {
    /// The attribute table every address space built by this crate family
    /// assumes: slots 0–3 as the `*_INDEX` constants above, 4–7 unused.
    #[must_use]
    pub const fn kernel_default() -> Self {
        Self::new()
            .with_attr0(ATTR_DEVICE_NGNRNE)
            .with_attr1(ATTR_DEVICE_NGNRE)
            .with_attr2(ATTR_NORMAL_WB)
            .with_attr3(ATTR_NORMAL_NC)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for Mair {
    unsafe fn load_unsafe() -> Self {
        let bits: u64;
        unsafe {
            core::arch::asm!("mrs {}, mair_el1", out(reg) bits, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(bits)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::StoreRegisterUnsafe for Mair {
    unsafe fn store_unsafe(self) {
        let bits = self.into_bits();
        unsafe {
            core::arch::asm!("msr mair_el1, {}", in(reg) bits, options(nomem, nostack, preserves_flags));
        }
    }
}
