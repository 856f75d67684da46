//! Memory and page allocator constants.

pub use kmem_abi::PAGE_SIZE as PAGE_SIZE_4KB;

pub const PAGE_SIZE_4KB_USIZE: usize = PAGE_SIZE_4KB as usize;

/// Start of RAM in the default physical layout; the kernel image loads here.
pub const KERNBASE: u64 = 0x8000_0000;

/// Top of usable RAM in the default physical layout (128 MiB after KERNBASE).
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// Reference-count slots needed to cover every page between KERNBASE and PHYSTOP.
pub const NUM_PHYS_PAGES: usize = ((PHYSTOP - KERNBASE) / PAGE_SIZE_4KB) as usize;

/// Written over a page when it is handed out.
pub const ALLOC_FILL_BYTE: u8 = 0x05;

/// Written over a page when it goes back on the free list.
pub const FREE_FILL_BYTE: u8 = 0x01;

const _: () = assert!(ALLOC_FILL_BYTE != FREE_FILL_BYTE);
const _: () = assert!(PAGE_SIZE_4KB.is_power_of_two());
