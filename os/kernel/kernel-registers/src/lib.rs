//! # Typed i386 Registers
//!
//! Bitfield models of the control registers the paging layer touches
//! ([`Cr0`](cr0::Cr0), [`Cr3`](cr3::Cr3)), the flags register
//! ([`Eflags`](eflags::Eflags)) and the `invlpg` TLB maintenance instruction.
//!
//! The register *values* are plain data and usable on any host. Loading and
//! storing them requires the `asm` feature and a 32-bit x86 target.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cr0;
pub mod cr3;
pub mod eflags;
pub mod tlb;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}

pub trait LoadRegister {
    /// It is generally safe to load this register even from user mode.
    fn load() -> Self;
}

impl<T> LoadRegisterUnsafe for T
where
    T: LoadRegister,
{
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}
