use kmem_abi::addr::PhysAddr;
use kmem_lib::align_up_u64;

use crate::error::{MmError, MmResult};
use crate::mm_constants::{PAGE_SIZE_4KB, PHYSTOP};

/// Physical range handed to the page allocator: from the first byte after the
/// kernel image (`end`) up to the top of RAM (`PhysTop`).
///
/// Neither bound needs to be page aligned. The usable pages are the full pages
/// between `heap_start` rounded up and `phys_top`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysLayout {
    heap_start: PhysAddr,
    phys_top: PhysAddr,
}

impl PhysLayout {
    pub fn new(heap_start: PhysAddr, phys_top: PhysAddr) -> MmResult<Self> {
        if phys_top < heap_start {
            return Err(MmError::InvalidLayout {
                start: heap_start.as_u64(),
                end: phys_top.as_u64(),
            });
        }
        Ok(Self {
            heap_start,
            phys_top,
        })
    }

    /// Default layout: everything after the kernel image up to `PHYSTOP`.
    pub fn kernel_default(end: PhysAddr) -> MmResult<Self> {
        Self::new(end, PhysAddr::new(PHYSTOP))
    }

    /// Default layout bounded by the linker's `end` symbol.
    #[cfg(target_os = "none")]
    pub fn from_linker(hhdm: crate::hhdm::Hhdm) -> MmResult<Self> {
        Self::kernel_default(hhdm.to_phys(crate::symbols::kernel_end()))
    }

    #[inline]
    pub fn heap_start(&self) -> PhysAddr {
        self.heap_start
    }

    #[inline]
    pub fn phys_top(&self) -> PhysAddr {
        self.phys_top
    }

    /// First page handed out. Physical page zero is never used: its address
    /// doubles as the free-list terminator.
    pub fn aligned_start(&self) -> PhysAddr {
        Self::first_page_from(self.heap_start)
    }

    /// `addr` rounded up to a page boundary, skipping physical page zero.
    pub fn first_page_from(addr: PhysAddr) -> PhysAddr {
        let page = PhysAddr::new(align_up_u64(addr.as_u64(), PAGE_SIZE_4KB));
        if page.is_null() {
            PhysAddr::new(PAGE_SIZE_4KB)
        } else {
            page
        }
    }

    /// Number of full pages in the range.
    pub fn page_count(&self) -> usize {
        let start = self.aligned_start().as_u64();
        let top = self.phys_top.as_u64();
        if top <= start {
            return 0;
        }
        ((top - start) / PAGE_SIZE_4KB) as usize
    }

    /// One past the last usable page.
    pub fn aligned_end(&self) -> PhysAddr {
        self.aligned_start()
            .offset(self.page_count() as u64 * PAGE_SIZE_4KB)
    }

    /// True when `page` is the base of one of the usable pages.
    pub fn contains(&self, page: PhysAddr) -> bool {
        page.is_aligned(PAGE_SIZE_4KB) && page >= self.aligned_start() && page < self.aligned_end()
    }
}
