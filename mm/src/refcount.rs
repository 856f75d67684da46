//! Per-page sharing counts.
//!
//! One `AtomicI32` per page slot, indexed by the page's distance from the
//! first usable page. The counters are only ever changed through
//! [`RefCountTable::atomic_adjust`] (a compare-and-swap retry loop) apart from
//! the two plain stores the allocator performs at state transitions: `1` when
//! a page leaves the free list and `0` when it goes back.
//!
//! Counter semantics:
//! - `0`: free, or not yet released by bootstrap
//! - `n >= 1`: allocated and shared by `n` owners
//!
//! A counter is briefly `-1` during bootstrap: every page starts at `0` and its
//! first release decrements it before the allocator resets it to `0`.
//!
//! Updates are atomic per slot and totally ordered per slot. Nothing orders
//! updates to different slots, and nothing orders them against the free-list
//! lock.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicI32, Ordering};

use kmem_abi::addr::PhysAddr;

use crate::mm_constants::PAGE_SIZE_4KB;

pub struct RefCountTable<'t> {
    slots: &'t [AtomicI32],
    base: PhysAddr,
}

impl<'t> RefCountTable<'t> {
    /// `base` is the page that maps to slot 0.
    pub const fn new(slots: &'t [AtomicI32], base: PhysAddr) -> Self {
        Self { slots, base }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn base(&self) -> PhysAddr {
        self.base
    }

    #[inline]
    pub fn slot_index(&self, page: PhysAddr) -> usize {
        (page.as_u64().wrapping_sub(self.base.as_u64()) / PAGE_SIZE_4KB) as usize
    }

    /// No range check beyond the slice bound: callers pass pages they obtained
    /// from the allocator.
    #[inline]
    fn slot(&self, page: PhysAddr) -> &AtomicI32 {
        &self.slots[self.slot_index(page)]
    }

    /// Add `delta` to `slot` with a load / compare-and-swap retry loop and
    /// return the value that was stored.
    ///
    /// Lock-free but not wait-free: a contended slot retries until its CAS
    /// lands.
    #[inline]
    pub fn atomic_adjust(slot: &AtomicI32, delta: i32) -> i32 {
        loop {
            let current = slot.load(Ordering::Relaxed);
            let updated = current.wrapping_add(delta);
            if slot
                .compare_exchange_weak(current, updated, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return updated;
            }
            spin_loop();
        }
    }

    /// Add one owner to `page`. Returns the new count.
    #[inline]
    pub fn add_reference(&self, page: PhysAddr) -> i32 {
        Self::atomic_adjust(self.slot(page), 1)
    }

    /// Drop one owner from `page`. Returns the new count.
    #[inline]
    pub fn remove_reference(&self, page: PhysAddr) -> i32 {
        Self::atomic_adjust(self.slot(page), -1)
    }

    #[inline]
    pub fn get(&self, page: PhysAddr) -> i32 {
        self.slot(page).load(Ordering::Acquire)
    }

    /// Plain store, for the FREE <-> ALLOCATED transitions only.
    #[inline]
    pub fn set(&self, page: PhysAddr, value: i32) {
        self.slot(page).store(value, Ordering::Release);
    }

    pub fn reset_all(&self) {
        for slot in self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }
}
