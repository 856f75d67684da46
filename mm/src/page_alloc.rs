//! Physical Page Allocator with Shared-Page Reference Counts
//!
//! Hands out single 4 KiB physical pages from an intrusive free list and keeps
//! a per-page sharing count so one page can have several owners (for example
//! after a copy-on-write fork) and is only reclaimed when the last owner lets
//! go.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  alloc_page()                          free_page(pa)          │
//! │      │                                      │                 │
//! │      ▼                                      ▼                 │
//! │  ┌──────────────┐                  ┌──────────────────┐       │
//! │  │ lock chain   │                  │ remove_reference │ CAS   │
//! │  │ pop head     │                  └────────┬─────────┘       │
//! │  │ refs[pa] = 1 │                     > 0   │   <= 0          │
//! │  │ unlock       │                  return ◄─┴─► refs[pa] = 0  │
//! │  └──────┬───────┘                               fill 0x01     │
//! │         ▼                                       lock chain    │
//! │     fill 0x05                                   push head     │
//! │                                                 unlock        │
//! │                                                               │
//! │  add_reference(pa) / remove_reference(pa): CAS only, no lock  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Synchronization
//!
//! The chain head and the links are guarded by one `IrqMutex`. The counters
//! are never guarded by it. A page only leaves the free list under the lock,
//! so the plain `refs[pa] = 1` store on allocation cannot race a decrement of
//! the same page. A page is pushed only after the pushing thread saw its count
//! reach zero or below.
//!
//! # Caller obligations
//!
//! Nothing here orders "the count of a page just reached zero" against "another
//! CPU is about to add a reference to it". Callers that share pages (page-table
//! code, fork) must hold the lock that protects the mapping they are copying or
//! tearing down across `add_reference`, so that a page with a live mapping can
//! never have its last reference dropped concurrently.

use core::ptr;
use core::sync::atomic::AtomicI32;

use bitflags::bitflags;
use kmem_abi::addr::{PhysAddr, VirtAddr};
use kmem_lib::{InitFlag, IrqMutex, klog_debug, klog_info, klog_warn};

use crate::error::{MmError, MmResult};
use crate::freelist::FreeList;
use crate::hhdm::Hhdm;
use crate::memory_layout::PhysLayout;
use crate::mm_constants::{ALLOC_FILL_BYTE, FREE_FILL_BYTE, PAGE_SIZE_4KB, PAGE_SIZE_4KB_USIZE};
use crate::refcount::RefCountTable;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Zero the page after the allocation fill.
        const ZERO = 0x01;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageAllocatorStats {
    /// Pages in the managed range.
    pub total: usize,
    /// Pages currently on the free list.
    pub free: usize,
    /// Pages not on the free list.
    pub allocated: usize,
}

pub struct PageAllocator<'t> {
    layout: PhysLayout,
    hhdm: Hhdm,
    free_list: IrqMutex<FreeList>,
    refs: RefCountTable<'t>,
    init: InitFlag,
    ready: InitFlag,
}

impl<'t> PageAllocator<'t> {
    /// Build an allocator for `layout` with an empty free list. Call
    /// [`PageAllocator::init`] before use.
    ///
    /// `slots` must hold at least one counter per page in `layout`.
    ///
    /// # Safety
    ///
    /// Every page in `layout` must be mapped writable at `hhdm`, and must be
    /// used by nothing but this allocator and the owners it hands pages to,
    /// for as long as the allocator lives.
    pub unsafe fn new(layout: PhysLayout, hhdm: Hhdm, slots: &'t [AtomicI32]) -> MmResult<Self> {
        let pages = layout.page_count();
        if slots.len() < pages {
            return Err(MmError::TableTooSmall {
                pages,
                slots: slots.len(),
            });
        }

        klog_debug!(
            "page allocator: range [{:#x}, {:#x}) -> {} pages, {} refcount slots",
            layout.heap_start().as_u64(),
            layout.phys_top().as_u64(),
            pages,
            slots.len()
        );

        Ok(Self {
            layout,
            hhdm,
            free_list: IrqMutex::new(FreeList::new()),
            refs: RefCountTable::new(slots, layout.aligned_start()),
            init: InitFlag::new(),
            ready: InitFlag::new(),
        })
    }

    /// Zero every counter and release the whole layout onto the free list.
    ///
    /// Runs once, before any concurrent allocator traffic.
    pub fn init(&self) -> MmResult {
        if !self.init.init_once() {
            return Err(MmError::AlreadyInitialized);
        }

        self.refs.reset_all();
        self.release_range(self.layout.heap_start(), self.layout.phys_top());
        self.ready.mark_set();

        klog_info!(
            "page allocator ready: {} pages available",
            self.free_list.lock().len()
        );
        Ok(())
    }

    /// Free every full page in `[start, end)` in ascending address order,
    /// starting at `start` rounded up to a page boundary (never page zero).
    ///
    /// Bootstrap path: each page is expected to be at count `0`, so its
    /// release drives the count to `-1` and pushes it.
    pub fn release_range(&self, start: PhysAddr, end: PhysAddr) {
        let mut page = PhysLayout::first_page_from(start);

        let mut released = 0usize;
        while let Some(next) = page.checked_offset(PAGE_SIZE_4KB) {
            if next > end {
                break;
            }
            self.free_page(page);
            released += 1;
            page = next;
        }

        klog_debug!(
            "page allocator: released {} pages from [{:#x}, {:#x})",
            released,
            start.as_u64(),
            end.as_u64()
        );
    }

    /// Take one page off the free list. `None` when memory is exhausted.
    ///
    /// The returned page has a sharing count of exactly 1 and is filled with
    /// `ALLOC_FILL_BYTE`.
    #[inline]
    pub fn alloc_page(&self) -> Option<PhysAddr> {
        self.alloc_page_flags(AllocFlags::empty())
    }

    pub fn alloc_page_flags(&self, flags: AllocFlags) -> Option<PhysAddr> {
        let page = {
            let mut list = self.free_list.lock();
            // SAFETY: only pages of `layout` are ever pushed, and they stay
            // mapped through `hhdm` (constructor contract).
            let page = unsafe { list.pop(self.hhdm) };
            if let Some(page) = page {
                self.refs.set(page, 1);
            }
            page
        };

        let Some(page) = page else {
            klog_info!("alloc_page: no free pages");
            return None;
        };

        self.fill_page(page, ALLOC_FILL_BYTE);
        if flags.contains(AllocFlags::ZERO) {
            self.fill_page(page, 0);
        }
        Some(page)
    }

    /// Give up one unit of ownership of `page`. The page goes back on the free
    /// list when this was the last owner.
    ///
    /// # Panics
    ///
    /// Panics if `page` is not page aligned or not inside the managed range.
    /// The free list is untouched in that case. Debug builds also panic on a
    /// count underflow after bootstrap (a double free), before the push.
    pub fn free_page(&self, page: PhysAddr) {
        if let Err(err) = self.check_page(page) {
            panic!("free_page: {}", err);
        }

        let remaining = self.refs.remove_reference(page);
        if remaining > 0 {
            return;
        }
        if remaining < 0 && self.ready.is_set() {
            klog_warn!(
                "free_page: refcount underflow ({}) on page {:#x}",
                remaining,
                page.as_u64()
            );
        }
        // A second push would link the page to itself and drop the chain.
        debug_assert!(
            remaining == 0 || !self.ready.is_set(),
            "free_page: refcount underflow ({}) on page {:#x}",
            remaining,
            page.as_u64()
        );

        self.refs.set(page, 0);
        self.fill_page(page, FREE_FILL_BYTE);

        let mut list = self.free_list.lock();
        // SAFETY: the count just reached zero, so the caller held the last
        // reference and nobody else may touch the page.
        unsafe { list.push(self.hhdm, page) };
    }

    /// Register another owner of an allocated page. Returns the new count.
    ///
    /// Never fails. `page` is not validated; a page that had no owner is
    /// logged. See the module docs for the locking the caller must provide.
    #[inline]
    pub fn add_reference(&self, page: PhysAddr) -> i32 {
        let count = self.refs.add_reference(page);
        if count <= 1 {
            klog_warn!(
                "add_reference: page {:#x} had no owner (count now {})",
                page.as_u64(),
                count
            );
        }
        count
    }

    /// Drop one owner without freeing. Returns the new count.
    ///
    /// A page brought to zero here is *not* put back on the free list; use
    /// [`PageAllocator::free_page`] for the last reference.
    #[inline]
    pub fn remove_reference(&self, page: PhysAddr) -> i32 {
        self.refs.remove_reference(page)
    }

    #[inline]
    pub fn ref_count(&self, page: PhysAddr) -> i32 {
        self.refs.get(page)
    }

    /// Validate that `page` is a page base inside the managed range.
    pub fn check_page(&self, page: PhysAddr) -> MmResult {
        if !page.is_aligned(PAGE_SIZE_4KB) {
            return Err(MmError::NotAligned {
                address: page.as_u64(),
                required: PAGE_SIZE_4KB,
            });
        }
        if !self.layout.contains(page) {
            return Err(MmError::OutOfRange {
                address: page.as_u64(),
                start: self.layout.heap_start().as_u64(),
                end: self.layout.phys_top().as_u64(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn is_tracked(&self, page: PhysAddr) -> bool {
        self.check_page(page).is_ok()
    }

    pub fn stats(&self) -> PageAllocatorStats {
        let total = self.layout.page_count();
        let free = self.free_list.lock().len();
        PageAllocatorStats {
            total,
            free,
            allocated: total.saturating_sub(free),
        }
    }

    /// Visit every free page, head first, with the free-list lock held.
    ///
    /// `f` must not call back into this allocator.
    pub fn walk_free_list(&self, f: impl FnMut(PhysAddr)) {
        let list = self.free_list.lock();
        // SAFETY: the lock is held, so the links cannot change underneath us.
        unsafe { list.walk(self.hhdm, f) };
    }

    /// Page `alloc_page` would hand out next.
    pub fn peek_free(&self) -> Option<PhysAddr> {
        self.free_list.lock().peek()
    }

    #[inline]
    pub fn layout(&self) -> PhysLayout {
        self.layout
    }

    #[inline]
    pub fn hhdm(&self) -> Hhdm {
        self.hhdm
    }

    #[inline]
    pub fn page_virt(&self, page: PhysAddr) -> VirtAddr {
        self.hhdm.to_virt(page)
    }

    fn fill_page(&self, page: PhysAddr, value: u8) {
        // SAFETY: `page` is inside `layout` and the caller owns it exclusively
        // (just popped, or its last reference was just dropped).
        unsafe {
            ptr::write_bytes(
                self.page_virt(page).as_mut_ptr::<u8>(),
                value,
                PAGE_SIZE_4KB_USIZE,
            );
        }
    }
}

// =============================================================================
// OwnedPage - RAII wrapper for one unit of page ownership
// =============================================================================

/// One reference to an allocated page, released when dropped.
///
/// Several `OwnedPage`s may name the same physical page (see
/// [`OwnedPage::share`]); the page is returned to the allocator when the last
/// of them is dropped.
///
/// ```ignore
/// let page = OwnedPage::alloc_zeroed(kmem)?;
/// let alias = page.share();          // count 2
/// drop(page);                        // count 1
/// drop(alias);                       // back on the free list
/// ```
pub struct OwnedPage<'a, 't> {
    alloc: &'a PageAllocator<'t>,
    phys: PhysAddr,
}

impl<'a, 't> OwnedPage<'a, 't> {
    #[inline]
    pub fn alloc(alloc: &'a PageAllocator<'t>) -> MmResult<Self> {
        Self::alloc_flags(alloc, AllocFlags::empty())
    }

    #[inline]
    pub fn alloc_zeroed(alloc: &'a PageAllocator<'t>) -> MmResult<Self> {
        Self::alloc_flags(alloc, AllocFlags::ZERO)
    }

    pub fn alloc_flags(alloc: &'a PageAllocator<'t>, flags: AllocFlags) -> MmResult<Self> {
        let phys = alloc.alloc_page_flags(flags).ok_or(MmError::NoMemory)?;
        Ok(Self { alloc, phys })
    }

    /// Add an owner and return it.
    pub fn share(&self) -> Self {
        self.alloc.add_reference(self.phys);
        Self {
            alloc: self.alloc,
            phys: self.phys,
        }
    }

    #[inline]
    pub fn phys_addr(&self) -> PhysAddr {
        self.phys
    }

    #[inline]
    pub fn virt_addr(&self) -> VirtAddr {
        self.alloc.page_virt(self.phys)
    }

    #[inline]
    pub fn ref_count(&self) -> i32 {
        self.alloc.ref_count(self.phys)
    }

    #[inline]
    pub fn as_ptr<T>(&self) -> *const T {
        self.virt_addr().as_ptr()
    }

    /// # Safety
    ///
    /// The page may have other owners; writes through the pointer need
    /// whatever synchronization those owners expect.
    #[inline]
    pub unsafe fn as_mut_ptr<T>(&self) -> *mut T {
        self.virt_addr().as_mut_ptr()
    }

    /// Give up RAII tracking and hand the reference to the caller, who must
    /// eventually `free_page` it.
    #[inline]
    pub fn into_phys(self) -> PhysAddr {
        let phys = self.phys;
        core::mem::forget(self);
        phys
    }

    /// # Safety
    ///
    /// `phys` must carry a reference the caller owns (from `alloc_page`,
    /// `add_reference` or `into_phys`) that nothing else will free.
    #[inline]
    pub unsafe fn from_phys(alloc: &'a PageAllocator<'t>, phys: PhysAddr) -> Self {
        Self { alloc, phys }
    }
}

impl Drop for OwnedPage<'_, '_> {
    fn drop(&mut self) {
        self.alloc.free_page(self.phys);
    }
}

impl core::fmt::Debug for OwnedPage<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OwnedPage")
            .field("phys", &format_args!("{:#x}", self.phys.as_u64()))
            .finish()
    }
}
