use core::ptr;

use kmem_abi::addr::PhysAddr;
use kmem_lib::klog_debug;

use crate::error::{MmError, MmResult};
use crate::mm_constants::PAGE_SIZE_4KB_USIZE;
use crate::page_alloc::PageAllocator;

/// Give the caller a page it owns exclusively, holding the same bytes as
/// `phys`.
///
/// A page with a single owner is returned as is. A shared page is copied into
/// a fresh allocation and the caller's reference to the old page is dropped,
/// so the old page's count goes down by one and the new page starts at one.
/// On `NoMemory` the caller still holds its reference to `phys`.
///
/// The caller is responsible for remapping and TLB maintenance.
pub fn cow_break(alloc: &PageAllocator<'_>, phys: PhysAddr) -> MmResult<PhysAddr> {
    alloc.check_page(phys)?;

    let ref_count = alloc.ref_count(phys);
    if ref_count <= 1 {
        return Ok(phys);
    }

    let new_phys = alloc.alloc_page().ok_or(MmError::NoMemory)?;

    let hhdm = alloc.hhdm();
    // SAFETY: both pages are mapped through the allocator's direct map. The
    // new page is exclusively ours; the old one is only read.
    unsafe {
        ptr::copy_nonoverlapping(
            hhdm.to_virt(phys).as_ptr::<u8>(),
            hhdm.to_virt(new_phys).as_mut_ptr::<u8>(),
            PAGE_SIZE_4KB_USIZE,
        );
    }

    alloc.free_page(phys);

    klog_debug!(
        "cow_break: {:#x} (refs {}) -> {:#x}",
        phys.as_u64(),
        ref_count,
        new_phys.as_u64()
    );
    Ok(new_phys)
}
