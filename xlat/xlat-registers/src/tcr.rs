//! # `TCR_EL1` — Translation Control Register
//!
//! Geometry and walk behavior for both translation-table base registers.
//! This crate family only uses `TTBR0`, so [`Tcr::kernel_default`] disables
//! `TTBR1` walks outright.

use bitfield_struct::bitfield;

/// Shareability encoding: non-shareable.
pub const SH_NONE: u8 = 0b00;

/// Shareability encoding: outer shareable.
pub const SH_OUTER: u8 = 0b10;

/// Shareability encoding: inner shareable.
pub const SH_INNER: u8 = 0b11;

/// Cacheability encoding for table walks: write-back read/write-allocate.
pub const RGN_WBWA: u8 = 0b01;

/// `TG0` granule encoding: 4 KiB.
pub const TG0_4K: u8 = 0b00;

/// `IPS` encoding: 48-bit intermediate physical address size.
pub const IPS_48BIT: u8 = 0b101;

/// `TCR_EL1` through bit 38; everything above is left zero.
#[bitfield(u64)]
pub struct Tcr {
    /// **T0SZ** (bits 0..6): `64 - VA bits` for the `TTBR0` region.
    #[bits(6)]
    pub t0sz: u8,

    /// (bit 6): reserved, must be 0.
    #[bits(1)]
    __res0_6: u8,

    /// **EPD0** (bit 7): disable walks through `TTBR0` when set.
    pub epd0: bool,

    /// **IRGN0** (bits 8..10): inner cacheability of `TTBR0` walks.
    #[bits(2)]
    pub irgn0: u8,

    /// **ORGN0** (bits 10..12): outer cacheability of `TTBR0` walks.
    #[bits(2)]
    pub orgn0: u8,

    /// **SH0** (bits 12..14): shareability of `TTBR0` walks.
    #[bits(2)]
    pub sh0: u8,

    /// **TG0** (bits 14..16): `TTBR0` granule size.
    #[bits(2)]
    pub tg0: u8,

    /// **T1SZ** (bits 16..22): `64 - VA bits` for the `TTBR1` region.
    #[bits(6)]
    pub t1sz: u8,

    /// **A1** (bit 22): ASID is taken from `TTBR1` when set.
    pub a1: bool,

    /// **EPD1** (bit 23): disable walks through `TTBR1` when set.
    pub epd1: bool,

    /// **IRGN1** (bits 24..26): inner cacheability of `TTBR1` walks.
    #[bits(2)]
    pub irgn1: u8,

    /// **ORGN1** (bits 26..28): outer cacheability of `TTBR1` walks.
    #[bits(2)]
    pub orgn1: u8,

    /// **SH1** (bits 28..30): shareability of `TTBR1` walks.
    #[bits(2)]
    pub sh1: u8,

    /// **TG1** (bits 30..32): `TTBR1` granule size.
    #[bits(2)]
    pub tg1: u8,

    /// **IPS** (bits 32..35): intermediate physical address size.
    #[bits(3)]
    pub ips: u8,

    /// (bit 35): reserved, must be 0.
    #[bits(1)]
    __res0_35: u8,

    /// **AS** (bit 36): 16-bit ASIDs when set.
    pub asid16: bool,

    /// **TBI0** (bit 37): ignore top byte of `TTBR0` addresses.
    pub tbi0: bool,

    /// **TBI1** (bit 38): ignore top byte of `TTBR1` addresses.
    pub tbi1: bool,

    /// (bits 39..64): reserved / unused by this crate.
    #[bits(25)]
    __res0_39_63: u32,
}

impl Tcr {
    /// Translation control for a kernel-only `TTBR0` space of `va_bits`
    /// bits: 4 KiB granule, cacheable inner-shareable walks, 48-bit IPS,
    /// `TTBR1` disabled.
    ///
    /// ### Panics
    /// If `va_bits` is outside `25..=48`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn kernel_default(va_bits: u32) -> Self {
        assert!(
            va_bits >= 25 && va_bits <= 48,
            "VA width must be in 25..=48 bits"
        );
        Self::new()
            .with_t0sz((64 - va_bits) as u8)
            .with_irgn0(RGN_WBWA)
            .with_orgn0(RGN_WBWA)
            .with_sh0(SH_INNER)
            .with_tg0(TG0_4K)
            .with_epd1(true)
            .with_ips(IPS_48BIT)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for Tcr {
    unsafe fn load_unsafe() -> Self {
        let bits: u64;
        unsafe {
            core::arch::asm!("mrs {}, tcr_el1", out(reg) bits, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(bits)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::StoreRegisterUnsafe for Tcr {
    unsafe fn store_unsafe(self) {
        let bits = self.into_bits();
        unsafe {
            core::arch::asm!("msr tcr_el1, {}", in(reg) bits, options(nomem, nostack, preserves_flags));
        }
    }
}
