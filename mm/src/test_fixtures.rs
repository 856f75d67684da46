use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;
use std::sync::Once;
use std::sync::atomic::AtomicI32;
use std::vec::Vec;

use kmem_abi::addr::{PhysAddr, VirtAddr};
use kmem_lib::{KlogLevel, klog_register_backend, klog_set_level};

use crate::hhdm::Hhdm;
use crate::memory_layout::PhysLayout;
use crate::mm_constants::{KERNBASE, PAGE_SIZE_4KB, PAGE_SIZE_4KB_USIZE};
use crate::page_alloc::PageAllocator;

/// Physical address the first page of every arena pretends to live at.
pub const ARENA_PHYS_BASE: u64 = KERNBASE;

static LOGGING: Once = Once::new();

fn print_backend(args: core::fmt::Arguments<'_>) {
    std::println!("{}", args);
}

/// Send allocator log lines to the test's captured stdout.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        klog_register_backend(print_backend);
        klog_set_level(KlogLevel::Debug);
    });
}

/// Page-aligned heap buffer standing in for a stretch of physical RAM.
pub struct PageBuffer {
    ptr: NonNull<u8>,
    pages: usize,
}

// SAFETY: the buffer is plain memory; sharing rules are those of the
// allocator built on top of it.
unsafe impl Send for PageBuffer {}
unsafe impl Sync for PageBuffer {}

impl PageBuffer {
    pub fn new(pages: usize) -> Self {
        let pages = pages.max(1);
        let ptr = unsafe { alloc_zeroed(Self::layout(pages)) };
        let ptr = NonNull::new(ptr).expect("test page buffer allocation failed");
        Self { ptr, pages }
    }

    fn layout(pages: usize) -> Layout {
        Layout::from_size_align(pages * PAGE_SIZE_4KB_USIZE, PAGE_SIZE_4KB_USIZE)
            .expect("test page buffer layout")
    }

    pub fn base(&self) -> VirtAddr {
        VirtAddr::from(self.ptr.as_ptr())
    }

    pub fn page_bytes(&self, index: usize) -> &[u8] {
        assert!(index < self.pages);
        unsafe {
            std::slice::from_raw_parts(
                self.ptr.as_ptr().add(index * PAGE_SIZE_4KB_USIZE),
                PAGE_SIZE_4KB_USIZE,
            )
        }
    }
}

impl Drop for PageBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.pages)) };
    }
}

/// Backing memory plus reference-count storage for one test allocator.
///
/// Physical page `i` of the arena is `ARENA_PHYS_BASE + i * PAGE_SIZE` and is
/// reached through an `Hhdm` pointing at the buffer.
pub struct TestArena {
    buffer: PageBuffer,
    slots: Vec<AtomicI32>,
    layout: PhysLayout,
    hhdm: Hhdm,
}

impl TestArena {
    pub fn new(pages: usize) -> Self {
        Self::with_bounds(pages, 0, 0)
    }

    /// Arena whose layout starts `start_skew` bytes after the first page and
    /// ends `end_trim` bytes before the end of the buffer.
    pub fn with_bounds(pages: usize, start_skew: u64, end_trim: u64) -> Self {
        init_test_logging();

        let buffer = PageBuffer::new(pages);
        let phys_base = PhysAddr::new(ARENA_PHYS_BASE);
        let hhdm = Hhdm::for_region(phys_base, buffer.base());
        let top = phys_base.offset(pages as u64 * PAGE_SIZE_4KB - end_trim);
        let layout = PhysLayout::new(phys_base.offset(start_skew), top)
            .expect("arena bounds must not be inverted");
        let slots = (0..pages).map(|_| AtomicI32::new(0)).collect();

        Self {
            buffer,
            slots,
            layout,
            hhdm,
        }
    }

    pub fn layout(&self) -> PhysLayout {
        self.layout
    }

    pub fn hhdm(&self) -> Hhdm {
        self.hhdm
    }

    pub fn slots(&self) -> &[AtomicI32] {
        &self.slots
    }

    /// Allocator over the arena, not yet bootstrapped.
    pub fn allocator(&self) -> PageAllocator<'_> {
        unsafe { PageAllocator::new(self.layout, self.hhdm, &self.slots) }
            .expect("arena slot table covers the layout")
    }

    /// Allocator over the arena with every page released.
    pub fn booted(&self) -> PageAllocator<'_> {
        let alloc = self.allocator();
        alloc.init().expect("fresh allocator initializes");
        alloc
    }

    /// Physical address of arena page `index`.
    pub fn page(&self, index: usize) -> PhysAddr {
        PhysAddr::new(ARENA_PHYS_BASE + index as u64 * PAGE_SIZE_4KB)
    }

    /// Snapshot of a page's contents.
    pub fn read_page(&self, page: PhysAddr) -> Vec<u8> {
        let index = ((page.as_u64() - ARENA_PHYS_BASE) / PAGE_SIZE_4KB) as usize;
        self.buffer.page_bytes(index).to_vec()
    }

    /// Free-list contents, head first.
    pub fn chain(alloc: &PageAllocator<'_>) -> Vec<PhysAddr> {
        let mut pages = Vec::new();
        alloc.walk_free_list(|page| pages.push(page));
        pages
    }
}
