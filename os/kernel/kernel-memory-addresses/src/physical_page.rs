use crate::{PAGE_SHIFT, PhysicalAddress, align_down};
use core::fmt;

/// Base of one 4 KiB physical frame.
///
/// ### Invariants
/// - The low 12 bits of the base are always zero.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u32);

impl PhysicalPage {
    /// Frame that contains `addr` (aligns down to the frame boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self(align_down(addr.as_u32()))
    }

    /// Frame with the given index (`base = index * 4096`).
    ///
    /// Returns `None` for indices beyond the 32-bit physical space.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index >= (1 << (32 - PAGE_SHIFT)) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let base = (index as u32) << PAGE_SHIFT;
        Some(Self(base))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }

    /// Index of this frame counted from physical address zero.
    #[inline]
    #[must_use]
    pub const fn frame_index(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    /// Full address for the in-frame offset `off` (only the low 12 bits are used).
    #[inline]
    #[must_use]
    pub const fn join(self, off: u32) -> PhysicalAddress {
        PhysicalAddress::new(self.0 | (off & crate::PAGE_OFFSET_MASK))
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl TryFrom<PhysicalAddress> for PhysicalPage {
    type Error = PhysicalAddress;

    /// Accept only frame-aligned addresses; the unaligned address is returned as error.
    fn try_from(value: PhysicalAddress) -> Result<Self, Self::Error> {
        if value.is_page_aligned() {
            Ok(Self(value.as_u32()))
        } else {
            Err(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip_and_bounds() {
        let p = PhysicalPage::from_index(0x1234).unwrap();
        assert_eq!(p.base().as_u32(), 0x0123_4000);
        assert_eq!(p.frame_index(), 0x1234);
        assert!(PhysicalPage::from_index(1 << 20).is_none());
        assert_eq!(p.join(0x1_0042).as_u32(), 0x0123_4042);
    }

    #[test]
    fn try_from_rejects_unaligned() {
        assert!(PhysicalPage::try_from(PhysicalAddress::new(0x1001)).is_err());
        assert_eq!(
            PhysicalPage::try_from(PhysicalAddress::new(0x2000)).map(PhysicalPage::frame_index),
            Ok(2)
        );
    }
}
