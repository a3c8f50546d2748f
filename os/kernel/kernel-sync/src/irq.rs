//! Interrupt masking via the `IF` flag.
//!
//! On targets other than i386 the guard is inert so code using it can be
//! tested on the host.

/// `IF` (bit 9) in EFLAGS.
const EFLAGS_IF: u32 = 1 << 9;

/// Disables hardware interrupts (`cli`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `cli` is permitted.
#[cfg(target_arch = "x86")]
#[inline]
pub fn cli_stop_interrupts() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
}

/// Enables hardware interrupts (`sti`).
#[cfg(target_arch = "x86")]
#[inline]
pub fn sti_enable_interrupts() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
}

/// Returns the current `EFLAGS` value (via `pushfd/pop`).
#[cfg(target_arch = "x86")]
#[inline]
#[must_use]
pub fn eflags() -> u32 {
    let r: u32;
    unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(nostack, preserves_flags)) }
    r
}

#[cfg(not(target_arch = "x86"))]
#[inline]
pub const fn cli_stop_interrupts() {}

#[cfg(not(target_arch = "x86"))]
#[inline]
pub const fn sti_enable_interrupts() {}

/// Host builds report interrupts as disabled.
#[cfg(not(target_arch = "x86"))]
#[inline]
#[must_use]
pub const fn eflags() -> u32 {
    0
}

/// `true` if hardware interrupts are currently enabled.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    eflags() & EFLAGS_IF != 0
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `sti` is only issued on drop if interrupts were enabled when the guard
/// was created, so guards nest.
///
/// ```no_run
/// use kernel_sync::IrqGuard;
///
/// {
///     let _g = IrqGuard::new();
///     // no interrupt handler runs here
/// }
/// ```
pub struct IrqGuard {
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }

    /// Whether interrupts will be re-enabled when this guard drops.
    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti_enable_interrupts();
        }
    }
}
