//! # i386 Paging Structures
//!
//! Typed views of the two paging levels:
//!
//! - [`pd`]: the page directory (one per address space, referenced by CR3)
//! - [`pt`]: page tables (linked from directory entries, map 4 KiB pages)
//!
//! Both are 4 KiB-aligned arrays of 1024 32-bit entries, accessed through
//! typed indices so out-of-range access is impossible by construction.
//!
//! ```text
//! | 31‒22     | 21‒12     | 11‒0   |
//! | Directory | Table     | Offset |
//! ```

pub mod pd;
pub mod pt;

use kernel_memory_addresses::VirtualAddress;
use pd::DirIndex;
use pt::TableIndex;

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirIndex, TableIndex) {
    (DirIndex::from(va), TableIndex::from(va))
}
