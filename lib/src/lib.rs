#![cfg_attr(not(test), no_std)]

pub mod cpu;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod ports;

pub mod alignment;
pub mod init_flag;
pub mod klog;
pub mod spinlock;

pub use alignment::{
    align_down_u64, align_down_usize, align_up_u64, align_up_usize, is_aligned_u64,
    is_aligned_usize,
};
pub use init_flag::InitFlag;
pub use klog::{
    KlogBackend, KlogLevel, klog_get_level, klog_init, klog_is_enabled, klog_register_backend,
    klog_set_level,
};
pub use spinlock::{IrqMutex, IrqMutexGuard};
