//! Interrupt flag management: irqsave/irqrestore.
//!
//! On bare-metal x86_64 these touch RFLAGS.IF through the `x86_64` crate. On
//! hosted targets there is no interrupt flag we are allowed to change, so the
//! pair degrades to no-ops and spinlocks behave as plain spinlocks.

/// RFLAGS.IF
pub const RFLAGS_IF: u64 = 1 << 9;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod imp {
    use x86_64::instructions::interrupts;
    use x86_64::registers::rflags;

    #[inline(always)]
    pub fn save_flags_cli() -> u64 {
        let flags = rflags::read_raw();
        interrupts::disable();
        flags
    }

    #[inline(always)]
    pub fn restore_flags(flags: u64) {
        if flags & super::RFLAGS_IF != 0 {
            interrupts::enable();
        }
    }

    #[inline(always)]
    pub fn are_interrupts_enabled() -> bool {
        interrupts::are_enabled()
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod imp {
    #[inline(always)]
    pub fn save_flags_cli() -> u64 {
        0
    }

    #[inline(always)]
    pub fn restore_flags(_flags: u64) {}

    #[inline(always)]
    pub fn are_interrupts_enabled() -> bool {
        false
    }
}

/// Save RFLAGS and disable interrupts. Returns the saved flags.
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    imp::save_flags_cli()
}

/// Restore the interrupt flag from saved RFLAGS. Only re-enables interrupts
/// if they were enabled when the flags were saved.
#[inline(always)]
pub fn restore_flags(flags: u64) {
    imp::restore_flags(flags)
}

#[inline(always)]
pub fn are_interrupts_enabled() -> bool {
    imp::are_interrupts_enabled()
}
