//! # Virtual and Physical Memory Address Types (i386)
//!
//! Strongly typed wrappers for raw 32-bit memory addresses and 4 KiB page
//! bases used in paging and memory management code.
//!
//! ## Overview
//!
//! The kernel runs in 32-bit protected mode with classic two-level paging,
//! so every address that reaches the MMU fits in a `u32` and every page is
//! exactly [`PAGE_SIZE`] bytes. The types in this crate keep physical and
//! virtual addresses apart at compile time while remaining zero-cost
//! wrappers around `u32`:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage`] | Refer to physical memory frames. |
//!
//! ## Arithmetic
//!
//! Address arithmetic that can leave the 4 GiB space is exposed as
//! `checked_*` functions returning [`Option`]; callers on the paging path
//! treat overflow as failure and never wrap silently.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0400_1234);
//! let (page, off) = va.split();
//! assert_eq!(page.base().as_u32(), 0x0400_1000);
//! assert_eq!(off, 0x234);
//! assert_eq!(page.base().checked_add(off), Some(va));
//!
//! let pa = PhysicalAddress::new(0x0010_0042);
//! assert!(!pa.is_page_aligned());
//! assert_eq!(pa.page().frame_index(), 0x100);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of one page / frame in bytes.
pub const PAGE_SIZE: u32 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the in-page offset bits.
pub const PAGE_OFFSET_MASK: u32 = PAGE_SIZE - 1;

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Round `value` down to a multiple of [`PAGE_SIZE`].
#[inline]
#[must_use]
pub const fn align_down(value: u32) -> u32 {
    value & !PAGE_OFFSET_MASK
}

/// Round `value` up to a multiple of [`PAGE_SIZE`].
///
/// Returns `None` if the result does not fit into 32 bits.
#[inline]
#[must_use]
pub const fn checked_align_up(value: u32) -> Option<u32> {
    match value.checked_add(PAGE_OFFSET_MASK) {
        Some(v) => Some(align_down(v)),
        None => None,
    }
}

/// Round a 64-bit physical quantity up to a multiple of [`PAGE_SIZE`], saturating.
///
/// Memory maps describe ranges with 64-bit values; this helper is used when
/// clamping them into the 32-bit physical space.
#[inline]
#[must_use]
pub const fn align_up_u64(value: u64) -> u64 {
    let mask = PAGE_OFFSET_MASK as u64;
    value.saturating_add(mask) & !mask
}

/// Number of pages needed to cover `len` bytes.
#[inline]
#[must_use]
pub const fn pages_for(len: u32) -> u32 {
    len.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x1fff), 0x1000);
        assert_eq!(checked_align_up(0x1001), Some(0x2000));
        assert_eq!(checked_align_up(0x2000), Some(0x2000));
        assert_eq!(checked_align_up(u32::MAX), None);
        assert_eq!(align_up_u64(u64::MAX), u64::MAX & !0xfff);
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
    }
}
