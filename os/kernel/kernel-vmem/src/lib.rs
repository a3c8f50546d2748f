//! # Virtual Memory Support (i386)
//!
//! Classic two-level 32-bit paging helpers for the kernel.
//!
//! ## What you get
//! - An [`address space`](address_space) rooted at one page directory.
//! - x86 paging-entry bits ([`PageEntryBits`]) with the permission helpers
//!   the kernel needs.
//! - 4 KiB-aligned [`PageDirectory`](page_table::pd::PageDirectory) and
//!   [`PageTable`](page_table::pt::PageTable) wrappers with typed indices.
//! - Tiny interfaces for the collaborators of the paging code:
//!   [`FrameAlloc`], [`PhysMapper`] and [`Mmu`].
//!
//! ## i386 Virtual Address → Physical Address Walk
//!
//! Each 32-bit virtual address is divided into three fields:
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ```text
//!  CR3 → PD  →  PT  →  Physical Page
//!        │      │
//!        │      └───► PTE (Page Table Entry)     → maps 4 KiB page
//!        └──────────► PDE (Page Directory Entry) → links one PT
//! ```
//!
//! Each level holds 1024 entries of 4 bytes, so one directory entry spans
//! 4 MiB of virtual memory. Large (4 MiB) pages are never used.
//!
//! ### Permissions
//!
//! The CPU intersects the `RW` and `US` bits of the PDE and the PTE. Directory
//! entries are therefore created permissive (writable, `US` when the leaves
//! are user pages) and the leaf decides the final rights.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod address_space;
mod page_entry_bits;
pub mod page_table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::address_space::{AddressSpace, Drained, MapError, MapOutcome, RootPage, UnmapError};
pub use crate::page_entry_bits::PageEntryBits;
use crate::page_table::pd::PageDirectory;
use crate::page_table::pt::PageTable;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Source of **physical** 4 KiB frames for page tables and mapped pages.
///
/// Returned frames **must** be 4 KiB aligned. `None` means out of memory.
pub trait FrameAlloc {
    /// Allocate any free frame.
    fn alloc_4k(&mut self) -> Option<PhysicalPage>;

    /// Allocate a free frame whose base lies below `limit`.
    ///
    /// The default just tries [`alloc_4k`](Self::alloc_4k) and rejects frames
    /// at or above the limit (leaking nothing, the frame is handed back).
    fn alloc_4k_below(&mut self, limit: PhysicalAddress) -> Option<PhysicalPage> {
        let page = self.alloc_4k()?;
        if page.base() < limit {
            Some(page)
        } else {
            self.free_4k(page);
            None
        }
    }

    /// Return a frame. Freeing a frame that is not allocated is tolerated.
    fn free_4k(&mut self, page: PhysicalPage);
}

/// Converts physical addresses to usable pointers in the current virtual
/// address space (identity map in the kernel, a backing buffer in tests).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be reachable through the mapper and writable.
    /// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
    ///   for `'a`.
    /// - Type `T` must match the bytes at `pa` and must not straddle a frame.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// Borrow a [`PageDirectory`] in this frame.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn pd_mut(&self, page: PhysicalPage) -> &mut PageDirectory {
        // SAFETY: page-table frames are only ever owned by the paging code.
        unsafe { self.phys_to_mut::<PageDirectory>(page.base()) }
    }

    /// Borrow a [`PageTable`] in this frame.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn pt_mut(&self, page: PhysicalPage) -> &mut PageTable {
        // SAFETY: see `pd_mut`.
        unsafe { self.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Borrow the 4096 bytes of a frame.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn frame_bytes_mut(&self, page: PhysicalPage) -> &mut [u8; PAGE_SIZE as usize] {
        // SAFETY: a whole frame is always reachable through the mapper.
        unsafe { self.phys_to_mut::<[u8; PAGE_SIZE as usize]>(page.base()) }
    }

    /// Fill a frame with zeros.
    #[inline]
    fn zero_frame(&self, page: PhysicalPage) {
        self.frame_bytes_mut(page).fill(0);
    }
}

/// The paging unit of the CPU.
///
/// The real implementation touches CR0, CR3 and `invlpg`; tests record the calls.
pub trait Mmu {
    /// Make `root` the active page directory (load CR3).
    ///
    /// # Safety
    /// The directory must map the currently executing code and stack.
    unsafe fn load_root(&mut self, root: RootPage);

    /// Drop a stale translation of `va` from the TLB.
    fn invalidate_page(&mut self, va: VirtualAddress);

    /// Turn on paging (CR0.PG). Only called once, after the first `load_root`.
    ///
    /// # Safety
    /// The active directory must identity-map the executing code.
    unsafe fn enable_paging(&mut self);
}

impl<T: FrameAlloc + ?Sized> FrameAlloc for &mut T {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage> {
        (**self).alloc_4k()
    }

    #[inline]
    fn alloc_4k_below(&mut self, limit: PhysicalAddress) -> Option<PhysicalPage> {
        (**self).alloc_4k_below(limit)
    }

    #[inline]
    fn free_4k(&mut self, page: PhysicalPage) {
        (**self).free_4k(page);
    }
}
