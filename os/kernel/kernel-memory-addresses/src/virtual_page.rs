use crate::{PAGE_SIZE, VirtualAddress, align_down};
use core::fmt;

/// Base of one 4 KiB virtual page.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u32);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to the page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(align_down(addr.as_u32()))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    /// The following page, or `None` at the top of the address space.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(PAGE_SIZE) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Full address for the in-page offset `off` (only the low 12 bits are used).
    #[inline]
    #[must_use]
    pub const fn join(self, off: u32) -> VirtualAddress {
        VirtualAddress::new(self.0 | (off & crate::PAGE_OFFSET_MASK))
    }

    /// Iterate the pages covering `[start, end)`.
    ///
    /// `start` is aligned down, the range ends with the page containing `end - 1`.
    #[must_use]
    pub const fn range(start: VirtualAddress, end: VirtualAddress) -> PageRange {
        PageRange {
            next: align_down(start.as_u32()) as u64,
            end: end.as_u32() as u64,
        }
    }
}

/// Iterator over consecutive virtual pages, see [`VirtualPage::range`].
#[derive(Clone, Debug)]
pub struct PageRange {
    next: u64,
    end: u64,
}

impl Iterator for PageRange {
    type Item = VirtualPage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let page = VirtualPage(self.next as u32);
        self.next += u64::from(PAGE_SIZE);
        Some(page)
    }
}

impl core::iter::FusedIterator for PageRange {}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = VirtualAddress;

    fn try_from(value: VirtualAddress) -> Result<Self, Self::Error> {
        if value.is_page_aligned() {
            Ok(Self(value.as_u32()))
        } else {
            Err(value)
        }
    }
}
