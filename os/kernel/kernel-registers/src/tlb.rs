//! Translation lookaside buffer maintenance.

use kernel_memory_addresses::VirtualAddress;

/// Drop the cached translation for the page containing `va` on this CPU.
///
/// # Safety
/// Must run at CPL0.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline]
pub unsafe fn invlpg(va: VirtualAddress) {
    let addr = va.as_usize();
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) addr, options(nostack, preserves_flags));
    }
}

/// Host builds have no TLB to maintain.
///
/// # Safety
/// Always safe; kept `unsafe` to match the hardware signature.
#[cfg(not(all(feature = "asm", target_arch = "x86")))]
#[inline]
pub const unsafe fn invlpg(_va: VirtualAddress) {}
