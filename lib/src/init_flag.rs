use core::sync::atomic::{AtomicBool, Ordering};

/// One-shot initialization flag.
///
/// `init_once()` returns true for exactly one caller; every later caller sees
/// false. Used to enforce "initialize exactly once" contracts without a lock.
pub struct InitFlag {
    set: AtomicBool,
}

impl InitFlag {
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    /// Claim the flag. True only for the first caller.
    #[inline]
    pub fn init_once(&self) -> bool {
        self.set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mark_set(&self) {
        self.set.store(true, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
