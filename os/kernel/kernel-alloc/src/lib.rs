//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! The physical and virtual memory managers of the kernel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Virtual Memory Manager (VMM)         │
//! │    • Kernel directory and identity map              │
//! │    • Per-process address spaces                     │
//! │    • Map / unmap / resolve / permission checks      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • Identity mapping of low physical memory        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • 4 KiB frames, one bit each                     │
//! │    • First fit, optional address ceiling            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! A fixed bitmap covering the whole 32-bit physical space, filled from the
//! boot memory map. Low memory (below 1 MiB), the kernel image and boot
//! modules always stay reserved.
//!
//! ### Kernel Heap ([`heap`])
//!
//! A first-fit free list over a fixed region, wrapped in a spin lock so it
//! can serve as the global allocator.
//!
//! ### Physical Mapper ([`phys_mapper`])
//!
//! The kernel identity-maps `[0, min(64 MiB, top of RAM))`, so a physical
//! address in that range can be dereferenced directly.
//!
//! ### Virtual Memory Manager ([`vmm`])
//!
//! Builds the kernel directory, creates address spaces that share the kernel
//! page tables, switches between them and releases them again. The CPU side
//! lives behind the [`Mmu`](kernel_vmem::Mmu) trait; [`mmu::HardwareMmu`] is
//! the implementation for the real machine.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! use kernel_info::boot::{BootInfo, MemoryRegion, PhysRange};
//!
//! let regions = [MemoryRegion::usable(0, 0x80_0000)];
//! let boot = BootInfo::new(&regions, PhysRange::new(0x10_0000, 0x14_0000));
//!
//! let mut allocator = Box::new(BitmapFrameAlloc::new());
//! let stats = allocator.init(&boot).unwrap();
//! if let Some(frame) = allocator.alloc() {
//!     assert!(frame.base().as_u32() >= 0x14_0000);
//!     allocator.free(frame);
//! }
//! assert_eq!(allocator.stats(), stats);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod frame_alloc;
pub mod heap;
#[cfg(target_arch = "x86")]
pub mod mmu;
pub mod phys_mapper;
pub mod vmm;
