//! Intrusive free-page chain.
//!
//! The list needs no storage of its own: the first machine word of every
//! free page holds the physical address of the next free page, and `0`
//! terminates the chain. A link is only meaningful while its page is free;
//! the allocator overwrites it with the allocation fill as soon as the page
//! is handed out.
//!
//! `FreeList` itself does no locking. The allocator keeps it inside an
//! `IrqMutex`, and that lock is what orders every push and pop.

use kmem_abi::addr::PhysAddr;

use crate::hhdm::Hhdm;

pub struct FreeList {
    head: Option<PhysAddr>,
    len: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Next page `pop` would return.
    #[inline]
    pub fn peek(&self) -> Option<PhysAddr> {
        self.head
    }

    /// Link `page` in at the head.
    ///
    /// # Safety
    ///
    /// `page` must be a non-null page that is mapped writable through `hhdm`,
    /// owned by the caller, and not already on this list.
    pub unsafe fn push(&mut self, hhdm: Hhdm, page: PhysAddr) {
        debug_assert!(!page.is_null());
        let link = hhdm.to_virt(page).as_mut_ptr::<u64>();
        unsafe { link.write(self.head.map_or(0, PhysAddr::as_u64)) };
        self.head = Some(page);
        self.len += 1;
    }

    /// Unlink and return the head page.
    ///
    /// # Safety
    ///
    /// Every page on the list must still be mapped through `hhdm` with its
    /// link word intact.
    pub unsafe fn pop(&mut self, hhdm: Hhdm) -> Option<PhysAddr> {
        let page = self.head?;
        let next = unsafe { hhdm.to_virt(page).as_ptr::<u64>().read() };
        self.head = if next == 0 {
            None
        } else {
            Some(PhysAddr::new(next))
        };
        self.len -= 1;
        Some(page)
    }

    /// Visit every page on the list, head first.
    ///
    /// Stops after `len` pages so a corrupted link cannot loop forever.
    ///
    /// # Safety
    ///
    /// Same requirements as [`FreeList::pop`].
    pub unsafe fn walk(&self, hhdm: Hhdm, mut f: impl FnMut(PhysAddr)) {
        let mut cursor = self.head;
        let mut remaining = self.len;
        while let Some(page) = cursor {
            if remaining == 0 {
                break;
            }
            f(page);
            remaining -= 1;
            let next = unsafe { hhdm.to_virt(page).as_ptr::<u64>().read() };
            cursor = if next == 0 {
                None
            } else {
                Some(PhysAddr::new(next))
            };
        }
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm_constants::{PAGE_SIZE_4KB, PAGE_SIZE_4KB_USIZE};
    use kmem_abi::addr::VirtAddr;
    use std::vec::Vec;

    #[repr(C, align(4096))]
    #[derive(Clone, Copy)]
    struct Page([u8; PAGE_SIZE_4KB_USIZE]);

    const PHYS_BASE: u64 = 0x8000_0000;

    fn setup(pages: &mut [Page]) -> Hhdm {
        Hhdm::for_region(
            PhysAddr::new(PHYS_BASE),
            VirtAddr::from(pages.as_mut_ptr()),
        )
    }

    fn page(index: u64) -> PhysAddr {
        PhysAddr::new(PHYS_BASE + index * PAGE_SIZE_4KB)
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut backing = [Page([0; PAGE_SIZE_4KB_USIZE]); 3];
        let hhdm = setup(&mut backing);
        let mut list = FreeList::new();
        assert!(list.is_empty());

        unsafe {
            list.push(hhdm, page(0));
            list.push(hhdm, page(1));
            list.push(hhdm, page(2));
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.peek(), Some(page(2)));

        let popped: Vec<_> = core::iter::from_fn(|| unsafe { list.pop(hhdm) }).collect();
        assert_eq!(popped, [page(2), page(1), page(0)]);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn link_lives_in_first_word() {
        let mut backing = [Page([0xAA; PAGE_SIZE_4KB_USIZE]); 2];
        let hhdm = setup(&mut backing);
        let mut list = FreeList::new();
        unsafe {
            list.push(hhdm, page(0));
            list.push(hhdm, page(1));
        }

        let word = u64::from_ne_bytes(backing[1].0[..8].try_into().unwrap());
        assert_eq!(word, page(0).as_u64());
        let tail = u64::from_ne_bytes(backing[0].0[..8].try_into().unwrap());
        assert_eq!(tail, 0);
        assert!(backing[1].0[8..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn walk_visits_head_first() {
        let mut backing = [Page([0; PAGE_SIZE_4KB_USIZE]); 4];
        let hhdm = setup(&mut backing);
        let mut list = FreeList::default();
        for i in [3, 0, 2] {
            unsafe { list.push(hhdm, page(i)) };
        }

        let mut seen = Vec::new();
        unsafe { list.walk(hhdm, |p| seen.push(p)) };
        assert_eq!(seen, [page(2), page(0), page(3)]);
    }
}
