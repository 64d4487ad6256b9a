//! # Typed AArch64 System Registers
//!
//! The EL1 registers a stage-1 translation-table manager programs when it
//! turns the MMU on:
//!
//! | Register | Module | Role |
//! |----------|--------|------|
//! | `MAIR_EL1` | [`mair`] | Memory-attribute encodings selected by descriptor `AttrIndx`. |
//! | `TCR_EL1` | [`tcr`] | Translation control: VA width, granule, cacheability of walks. |
//! | `TTBR0_EL1` | [`ttbr`] | Physical base of the root translation table. |
//! | `SCTLR_EL1` | [`sctlr`] | System control: MMU enable, cache enables. |
//!
//! Register *values* are plain `bitfield-struct` types and build on any
//! host, which is how the value-construction logic is unit tested. The
//! `mrs`/`msr` accessors behind [`LoadRegisterUnsafe`] /
//! [`StoreRegisterUnsafe`] exist only with the `asm` feature on an AArch64
//! target.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "mair")]
pub mod mair;

#[cfg(feature = "sctlr")]
pub mod sctlr;

#[cfg(feature = "tcr")]
pub mod tcr;

#[cfg(feature = "ttbr")]
pub mod ttbr;

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
pub mod barrier;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety
    /// requirements. All registers here are EL1-privileged; reading them
    /// from EL0 traps.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety
    /// requirements. Writes to translation registers additionally require
    /// the appropriate barrier/ISB sequence before the new value is
    /// guaranteed to be observed by the MMU.
    unsafe fn store_unsafe(self);
}
