#![cfg_attr(not(test), no_std)]

pub mod cow;
pub mod error;
pub mod freelist;
pub mod hhdm;
pub mod kalloc;
pub mod memory_layout;
pub mod mm_constants;
pub mod page_alloc;
pub mod refcount;
#[cfg(target_os = "none")]
pub mod symbols;

#[cfg(test)]
mod test_fixtures;
#[cfg(test)]
mod tests_cow;
#[cfg(test)]
mod tests_smp;

pub use cow::cow_break;
pub use error::{MmError, MmResult};
pub use hhdm::Hhdm;
pub use kalloc::{kalloc, kfree, kinit, kmem, page_ref_dec, page_ref_inc, try_kmem};
pub use memory_layout::PhysLayout;
pub use page_alloc::{AllocFlags, OwnedPage, PageAllocator, PageAllocatorStats};
