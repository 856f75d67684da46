//! Kernel-wide page allocator instance.
//!
//! The kernel runs exactly one `PageAllocator`, covering `[end, PHYSTOP)`, with
//! its reference counts in a static table sized for every page between
//! `KERNBASE` and `PHYSTOP`. `kinit` builds and bootstraps it once during early
//! boot; the free functions below are the entry points the rest of the kernel
//! calls afterwards.

use core::sync::atomic::AtomicI32;

use kmem_abi::addr::PhysAddr;
use spin::Once;

use crate::error::{MmError, MmResult};
use crate::hhdm::Hhdm;
use crate::memory_layout::PhysLayout;
use crate::mm_constants::NUM_PHYS_PAGES;
use crate::page_alloc::PageAllocator;

static PAGE_REFS: [AtomicI32; NUM_PHYS_PAGES] = [const { AtomicI32::new(0) }; NUM_PHYS_PAGES];

static KMEM: Once<PageAllocator<'static>> = Once::new();

/// Build the kernel page allocator for `layout` and release every page in it.
///
/// # Safety
///
/// Same contract as [`PageAllocator::new`]: every page of `layout` is mapped
/// writable at `hhdm` and belongs to the allocator from now on.
pub unsafe fn kinit(layout: PhysLayout, hhdm: Hhdm) -> MmResult<&'static PageAllocator<'static>> {
    if KMEM.is_completed() {
        return Err(MmError::AlreadyInitialized);
    }
    let kmem = KMEM.try_call_once(|| unsafe { PageAllocator::new(layout, hhdm, &PAGE_REFS) })?;
    kmem.init()?;
    Ok(kmem)
}

/// Kernel boot path: allocator over `[end, PHYSTOP)` where `end` comes from the
/// linker script.
///
/// # Safety
///
/// See [`kinit`].
#[cfg(target_os = "none")]
pub unsafe fn kinit_default(hhdm: Hhdm) -> MmResult<&'static PageAllocator<'static>> {
    let layout = PhysLayout::from_linker(hhdm)?;
    unsafe { kinit(layout, hhdm) }
}

/// # Panics
///
/// Panics if called before `kinit`.
#[inline]
pub fn kmem() -> &'static PageAllocator<'static> {
    match KMEM.get() {
        Some(kmem) => kmem,
        None => panic!("page allocator used before kinit"),
    }
}

#[inline]
pub fn try_kmem() -> Option<&'static PageAllocator<'static>> {
    KMEM.get()
}

pub fn kalloc() -> Option<PhysAddr> {
    kmem().alloc_page()
}

pub fn kfree(page: PhysAddr) {
    kmem().free_page(page)
}

pub fn page_ref_inc(page: PhysAddr) -> i32 {
    kmem().add_reference(page)
}

pub fn page_ref_dec(page: PhysAddr) -> i32 {
    kmem().remove_reference(page)
}
