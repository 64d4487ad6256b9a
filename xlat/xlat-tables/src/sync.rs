//! # Coarse Locking
//!
//! The mapping engine itself is single-threaded by design: every operation
//! runs to completion with no suspension point. What needs protection is
//! *between* operations, once secondary cores can issue mapping calls.
//! [`SharedAddressSpace`] takes the coarse option deliberately — one lock
//! held for the duration of each call — because mapping traffic is
//! boot-time plus occasional remaps, not a throughput path.

use crate::MapError;
use crate::address_space::AddressSpace;
use crate::attributes::MemoryAttributes;
use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use xlat_addresses::{PhysicalAddress, VirtualAddress};

/// A test-and-test-and-set spin lock.
pub struct SpinLock<T> {
    /// `true` while some guard is live.
    locked: AtomicBool,
    inner: UnsafeCell<T>,
}

// SAFETY: the lock provides mutual exclusion, so only `T: Send` is needed
// for cross-thread sharing.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// One acquisition attempt; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then(|| SpinLockGuard { lock: self })
    }

    /// Spin until acquired.
    ///
    /// Spins on a plain load between acquisition attempts so contending
    /// cores hammer their caches, not the interconnect.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    /// Run `f` under the lock.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Direct access through `&mut self`; no contention is possible.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// An [`AddressSpace`] behind one coarse lock, safe to call from multiple
/// cores.
///
/// Each method acquires the lock for the full duration of the operation, so
/// the prefix-mapped/suffix-untouched failure semantics of the underlying
/// engine hold per caller.
pub struct SharedAddressSpace<const N: usize> {
    inner: SpinLock<AddressSpace<N>>,
}

impl<const N: usize> SharedAddressSpace<N> {
    #[must_use]
    pub const fn new(space: AddressSpace<N>) -> Self {
        Self {
            inner: SpinLock::new(space),
        }
    }

    /// See [`AddressSpace::map_region`].
    pub fn map_region(
        &self,
        name: &str,
        phys: PhysicalAddress,
        virt: VirtualAddress,
        size: u64,
        attrs: MemoryAttributes,
    ) -> Result<(), MapError> {
        self.inner
            .with_lock(|space| space.map_region(name, phys, virt, size, attrs))
    }

    /// See [`AddressSpace::unmap_region`].
    pub fn unmap_region(&self, virt: VirtualAddress, size: u64) -> Result<(), MapError> {
        self.inner.with_lock(|space| space.unmap_region(virt, size))
    }

    /// See [`AddressSpace::translate`].
    pub fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        self.inner.with_lock(|space| space.translate(virt))
    }

    /// See [`AddressSpace::allocated_tables`].
    pub fn allocated_tables(&self) -> usize {
        self.inner.with_lock(|space| space.allocated_tables())
    }

    /// Run `f` with the space held for several operations at once.
    pub fn with<R>(&self, f: impl FnOnce(&mut AddressSpace<N>) -> R) -> R {
        self.inner.with_lock(f)
    }
}
