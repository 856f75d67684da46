//! Higher Half Direct Map (HHDM) translation.
//!
//! The allocator tracks pages by physical address but has to write into them
//! (free-list links, debug fills, copies), so every allocator carries the
//! direct-map offset under which its physical range is mapped. An identity
//! mapped kernel uses offset zero.
//!
//! ```ignore
//! let hhdm = Hhdm::new(limine_hhdm_offset);
//! let virt = hhdm.to_virt(PhysAddr::new(0x8000_0000));
//! ```

use kmem_abi::addr::{PhysAddr, VirtAddr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hhdm {
    offset: u64,
}

impl Hhdm {
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    pub const fn identity() -> Self {
        Self { offset: 0 }
    }

    /// Direct map that places `phys_base` at `virt_base`.
    pub const fn for_region(phys_base: PhysAddr, virt_base: VirtAddr) -> Self {
        Self {
            offset: virt_base.as_u64().wrapping_sub(phys_base.as_u64()),
        }
    }

    #[inline]
    pub const fn offset(self) -> u64 {
        self.offset
    }

    /// Convert a physical address to its direct-map virtual address.
    ///
    /// Returns `VirtAddr::NULL` for null physical addresses.
    ///
    /// # Panics
    ///
    /// Panics if the translated address is not canonical.
    #[inline]
    pub fn to_virt(self, phys: PhysAddr) -> VirtAddr {
        if phys.is_null() {
            return VirtAddr::NULL;
        }
        VirtAddr::new(phys.as_u64().wrapping_add(self.offset))
    }

    /// Reverse translation; only meaningful for addresses produced by `to_virt`.
    #[inline]
    pub fn to_phys(self, virt: VirtAddr) -> PhysAddr {
        if virt.is_null() {
            return PhysAddr::NULL;
        }
        PhysAddr::new(virt.as_u64().wrapping_sub(self.offset))
    }
}
