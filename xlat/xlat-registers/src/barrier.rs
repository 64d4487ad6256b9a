//! # Barriers and TLB Maintenance
//!
//! The instruction sequence around translation-register writes: data
//! synchronization so prior table stores complete, instruction
//! synchronization so the new register values take effect, and full stage-1
//! TLB invalidation when the live tables change shape.

/// Data synchronization barrier, full system.
#[inline]
pub fn dsb_sy() {
    // SAFETY: barriers have no memory-safety side effects.
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }
}

/// Instruction synchronization barrier.
#[inline]
pub fn isb() {
    // SAFETY: barriers have no memory-safety side effects.
    unsafe {
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
}

/// Invalidate all stage-1 EL1 TLB entries, then synchronize.
///
/// # Safety
/// Must run at EL1. Callers must ensure the tables reachable from the live
/// `TTBR0` are consistent before execution continues past this call.
pub unsafe fn invalidate_all() {
    unsafe {
        core::arch::asm!(
            "dsb ishst",
            "tlbi vmalle1",
            "dsb ish",
            "isb",
            options(nostack, preserves_flags)
        );
    }
}
