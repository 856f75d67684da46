use kmem_abi::addr::VirtAddr;

/// Access to linker-provided section symbols, isolated here so other modules
/// avoid raw `extern "C"` declarations.
mod externs {
    unsafe extern "C" {
        /// First address after the kernel image, defined by the linker script.
        #[link_name = "end"]
        pub(crate) static KERNEL_END: [u8; 0];
    }
}

#[inline]
pub fn kernel_end() -> VirtAddr {
    let end = unsafe { &raw const externs::KERNEL_END };
    VirtAddr::new(end as u64)
}
