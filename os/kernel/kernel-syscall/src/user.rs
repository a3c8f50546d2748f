//! Raw `int 0x80` wrappers for i386 user programs.
//!
//! `ebx` is swapped in and out around the trap since LLVM may reserve it.

use crate::Sysno;

/// # Safety
/// The call must be valid for the current process.
#[inline]
pub unsafe fn syscall0(num: Sysno) -> u32 {
    let ret: u32;
    unsafe {
        core::arch::asm!("int 0x80", inlateout("eax") num as u32 => ret, options(nostack));
    }
    ret
}

/// # Safety
/// See [`syscall0`]; pointer arguments must be valid user memory.
#[inline]
pub unsafe fn syscall1(num: Sysno, arg1: u32) -> u32 {
    let ret: u32;
    unsafe {
        core::arch::asm!(
            "xchg ebx, {a1}",
            "int 0x80",
            "xchg ebx, {a1}",
            a1 = inout(reg) arg1 => _,
            inlateout("eax") num as u32 => ret,
            options(nostack)
        );
    }
    ret
}

/// # Safety
/// See [`syscall1`].
#[inline]
pub unsafe fn syscall3(num: Sysno, arg1: u32, arg2: u32, arg3: u32) -> u32 {
    let ret: u32;
    unsafe {
        core::arch::asm!(
            "xchg ebx, {a1}",
            "int 0x80",
            "xchg ebx, {a1}",
            a1 = inout(reg) arg1 => _,
            inlateout("eax") num as u32 => ret,
            in("ecx") arg2,
            in("edx") arg3,
            options(nostack)
        );
    }
    ret
}
