//! # Kernel Configuration and Boot Interface
//!
//! This crate defines the boot-time memory description handed to the kernel
//! and the fixed memory layout and segment constants shared by every kernel
//! subsystem. It is the single source of truth for these values.
//!
//! ## Modules
//!
//! ### Boot Information ([`boot`])
//! The boot collaborator's handoff:
//! * **Memory Map**: ordered `{base, length, kind}` descriptors
//! * **Kernel Image**: the physical range occupied by the kernel itself
//! * **Modules**: further physical ranges (e.g. the initramfs) that must
//!   never be handed out by the frame allocator
//!
//! ### Memory Layout ([`memory`])
//! Compile-time constants for the 32-bit address space:
//!
//! ```text
//! Virtual Address Space Layout (i386, every address space):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Identity map of low physical   │  kernel-only (no USER bit),
//!             │  memory (≤ IDENTITY_MAP_LIMIT)  │  page tables shared by all
//! 0x0400_0000 ├─────────────────────────────────┤ USER_IMAGE_BASE
//!             │  User image (ELF PT_LOAD)       │  per-process page tables
//!             │                ...              │
//! 0x040F_0000 ├─────────────────────────────────┤ USER_STACK_TOP - stack
//!             │  User stack (16 pages)          │
//! 0x0410_0000 ├─────────────────────────────────┤ USER_STACK_TOP
//!             │  unmapped                       │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ### Segments ([`segments`])
//! GDT selector values and the initial user `EFLAGS`, consumed when
//! synthesizing trap frames for user processes.
//!
//! ## Safety Guarantees
//!
//! The crate is `#![deny(unsafe_code)]`; compile-time assertions check that
//! the layout constants are consistent with each other.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod segments;
