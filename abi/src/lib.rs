//! kmem address ABI
//!
//! Physical and virtual address types shared by the allocator and its
//! callers.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod addr;

/// Standard 4KB page size, the only allocation granularity.
pub const PAGE_SIZE: u64 = 0x1000;

pub use addr::*;
