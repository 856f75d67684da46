//! Error types for the page allocator.
//!
//! Only exhaustion is a runtime condition. The address variants describe
//! programmer errors: `free_page` formats them into its panic message rather
//! than returning them, and `check_page` exposes the same test to callers that
//! want to validate an address up front.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    NoMemory,
    NotAligned { address: u64, required: u64 },
    OutOfRange { address: u64, start: u64, end: u64 },
    InvalidLayout { start: u64, end: u64 },
    TableTooSmall { pages: usize, slots: usize },
    AlreadyInitialized,
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMemory => write!(f, "out of memory for page allocation"),
            Self::NotAligned { address, required } => {
                write!(f, "address {:#x} not aligned to {:#x}", address, required)
            }
            Self::OutOfRange {
                address,
                start,
                end,
            } => write!(
                f,
                "address {:#x} outside page heap [{:#x}, {:#x})",
                address, start, end
            ),
            Self::InvalidLayout { start, end } => {
                write!(f, "invalid physical layout [{:#x}, {:#x})", start, end)
            }
            Self::TableTooSmall { pages, slots } => write!(
                f,
                "reference table has {} slots for {} pages",
                slots, pages
            ),
            Self::AlreadyInitialized => write!(f, "page allocator already initialized"),
        }
    }
}

/// Convenience result type for allocator operations.
pub type MmResult<T = ()> = Result<T, MmError>;
