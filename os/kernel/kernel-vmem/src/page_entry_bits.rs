use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage};

/// A single 32-bit i386 paging entry in its raw bitfield form.
///
/// Page-directory entries (PDE) and page-table entries (PTE) share this
/// layout when 4 MiB pages are not used, which is the only mode this kernel
/// runs in.
///
/// ### Bit layout
///
/// | Bits   | Name / Mnemonic   | Meaning |
/// |--------|-------------------|---------|
/// | 0      | `P` (present)     | Valid entry if set |
/// | 1      | `RW`              | Writable if set |
/// | 2      | `US`              | User-mode accessible if set |
/// | 3      | `PWT`             | Write-through caching |
/// | 4      | `PCD`             | Disable caching |
/// | 5      | `A`               | Accessed |
/// | 6      | `D`               | Dirty (PTE only) |
/// | 7      | `PS` / `PAT`      | Must stay 0 here |
/// | 8      | `G`               | Global (PTE only) |
/// | 9–11   | OS avail          | Ignored by hardware |
/// | 12–31  | `addr`            | Physical frame bits [31:12] |
///
/// ### Permission semantics
///
/// The effective permission of a page is the intersection of its PDE and PTE
/// bits: a user-accessible, writable page needs `US` and `RW` at **both**
/// levels. [`PageEntryBits::grants`] checks one level.
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::user_rw().with_frame(PhysicalAddress::new(0x0040_0000).page());
/// assert!(e.present() && e.user_access() && e.writable());
/// assert_eq!(e.frame().base().as_u32(), 0x0040_0000);
/// ```
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on the first write through a PTE.
    pub dirty: bool,

    /// Page Size in a PDE / PAT in a PTE (bit 7). Always 0 here.
    pub large_page: bool,

    /// Global (G, bit 8).
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical address bits [31:12].
    #[bits(20)]
    frame_bits_31_12: u32,
}

impl PageEntryBits {
    /// Bits that describe access rights (`P | RW | US`).
    pub const PERMISSION_MASK: u32 = 0b111;

    /// Present, supervisor-only, writable. Used for the kernel identity map.
    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present, user-accessible, read-only.
    #[inline]
    #[must_use]
    pub const fn user_ro() -> Self {
        Self::new().with_present(true).with_user_access(true)
    }

    /// Present, user-accessible, writable.
    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::user_ro().with_writable(true)
    }

    /// Only the `US` bit; the requirement used to validate user buffers.
    #[inline]
    #[must_use]
    pub const fn user() -> Self {
        Self::new().with_user_access(true)
    }

    /// Flags for a directory entry that links a table holding leaves with
    /// `leaf` permissions. Directory entries stay writable and carry `US`
    /// when the leaves are user-accessible; the leaf decides the final rights.
    #[inline]
    #[must_use]
    pub const fn table_link_for(leaf: Self) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(leaf.user_access())
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage {
        PhysicalAddress::new(self.frame_bits_31_12() << 12).page()
    }

    #[inline]
    pub const fn set_frame(&mut self, page: PhysicalPage) {
        self.set_frame_bits_31_12(page.base().as_u32() >> 12);
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(mut self, page: PhysicalPage) -> Self {
        self.set_frame(page);
        self
    }

    /// Only the permission bits (`P | RW | US`) of this entry.
    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> Self {
        Self::from_bits(self.into_bits() & Self::PERMISSION_MASK)
    }

    /// `true` if every permission bit set in `required` is also set here.
    #[inline]
    #[must_use]
    pub const fn grants(&self, required: Self) -> bool {
        let need = required.into_bits() & Self::PERMISSION_MASK;
        self.into_bits() & need == need
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_hardware() {
        assert_eq!(PageEntryBits::kernel_rw().into_bits(), 0b011);
        assert_eq!(PageEntryBits::user_rw().into_bits(), 0b111);
        let e = PageEntryBits::user_ro().with_frame(PhysicalAddress::new(0x1234_5000).page());
        assert_eq!(e.into_bits(), 0x1234_5005);
    }

    #[test]
    fn grants_checks_permission_subset() {
        let e = PageEntryBits::user_ro().with_accessed(true);
        assert!(e.grants(PageEntryBits::user()));
        assert!(!e.grants(PageEntryBits::user_rw()));
        assert!(!PageEntryBits::kernel_rw().grants(PageEntryBits::user()));
        assert_eq!(e.permissions(), PageEntryBits::user_ro());
    }

    #[test]
    fn table_links_follow_leaf_privilege() {
        assert!(PageEntryBits::table_link_for(PageEntryBits::user_ro()).user_access());
        assert!(PageEntryBits::table_link_for(PageEntryBits::user_ro()).writable());
        assert!(!PageEntryBits::table_link_for(PageEntryBits::kernel_rw()).user_access());
    }
}
