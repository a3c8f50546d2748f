//! # Address Space (i386, directory-rooted)
//!
//! Strongly-typed helpers to build and manipulate a **single** virtual address
//! space: one [`PageDirectory`] plus the [`PageTable`]s it links.
//!
//! ## Highlights
//!
//! - [`AddressSpace::map_one`] installs one 4 KiB mapping, creating the page
//!   table on demand. Existing mappings are never overwritten.
//! - [`AddressSpace::unmap_one`] clears a single PTE.
//! - [`AddressSpace::query`] translates a VA to a PA.
//! - [`AddressSpace::range_has_flags`] checks every page of a byte range.
//! - [`AddressSpace::copy_kernel_entries_from`] and
//!   [`AddressSpace::drain_private`] set up and tear down per-process spaces
//!   that share the kernel's page tables.
//!
//! ## Safety
//!
//! - Mutating active mappings requires TLB maintenance; the caller owns the
//!   [`Mmu`](crate::Mmu) and issues `invlpg` after [`map_one`](AddressSpace::map_one)
//!   and [`unmap_one`](AddressSpace::unmap_one).
//! - The provided [`PhysMapper`] must yield **writable** references to table frames.

use crate::page_table::pd::{DirIndex, PageDirectory, PdEntry};
use crate::page_table::pt::{PageTable, PtEntry, TableIndex};
use crate::page_table::split_indices;
use crate::{FrameAlloc, PageEntryBits, PhysMapper};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress, align_down};

/// The page directory frame of an [`AddressSpace`] (the value loaded into CR3).
pub type RootPage = PhysicalPage;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: RootPage,
    mapper: &'m M,
}

/// Why a mapping could not be installed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("mapping {va} -> {pa} is not page aligned")]
    Unaligned { va: VirtualAddress, pa: PhysicalAddress },
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("no frame left for a page table")]
    OutOfMemory,
}

/// Why a mapping could not be removed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UnmapError {
    #[error("{0} is not page aligned")]
    Unaligned(VirtualAddress),
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),
}

/// A frame handed back by [`AddressSpace::drain_private`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Drained {
    /// A frame that was mapped at the given address.
    Leaf(VirtualAddress, PhysicalPage),
    /// A page table private to the drained space.
    Table(PhysicalPage),
}

/// Side effects of a successful [`AddressSpace::map_one`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct MapOutcome {
    /// A page table had to be allocated for the covering directory slot.
    pub new_table: bool,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// View the address space whose directory lives in `root`.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: RootPage) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the page directory.
    #[inline]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    #[inline]
    fn pd_mut(&self) -> &mut PageDirectory {
        self.mapper.pd_mut(self.root)
    }

    #[inline]
    fn pt_mut(&self, page: PhysicalPage) -> &mut PageTable {
        self.mapper.pt_mut(page)
    }

    /// Clear every directory entry.
    pub fn clear(&self) {
        self.pd_mut().zero();
    }

    /// Map **one** 4 KiB page at `va → pa` with `leaf_flags`.
    ///
    /// A missing page table is allocated from `alloc`, zeroed and linked with
    /// [`PageEntryBits::table_link_for`] flags. An existing directory entry
    /// gains `US` if a user leaf is placed under it.
    ///
    /// # Errors
    /// - [`MapError::Unaligned`] if either address has in-page bits set.
    /// - [`MapError::AlreadyMapped`] if a present PTE exists; it is left untouched.
    /// - [`MapError::OutOfMemory`] if a needed page table cannot be allocated.
    pub fn map_one<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        leaf_flags: PageEntryBits,
    ) -> Result<MapOutcome, MapError> {
        if !va.is_page_aligned() || !pa.is_page_aligned() {
            return Err(MapError::Unaligned { va, pa });
        }

        let (di, ti) = split_indices(va);
        let pd = self.pd_mut();
        let pde = pd.get(di);
        let mut outcome = MapOutcome::default();

        let table = if let Some(table) = pde.next_table() {
            if self.pt_mut(table).get(ti).is_present() {
                return Err(MapError::AlreadyMapped(va));
            }
            if leaf_flags.user_access() && !pde.flags().user_access() {
                pd.set(di, PdEntry::make_table(table, pde.flags().with_user_access(true)));
            }
            table
        } else {
            let table = alloc.alloc_4k().ok_or(MapError::OutOfMemory)?;
            self.pt_mut(table).zero();
            pd.set(
                di,
                PdEntry::make_table(table, PageEntryBits::table_link_for(leaf_flags)),
            );
            outcome.new_table = true;
            table
        };

        self.pt_mut(table).set(ti, PtEntry::make_4k(pa.page(), leaf_flags));
        Ok(outcome)
    }

    /// Unmap a single 4 KiB page and return the frame it pointed at.
    ///
    /// Page tables are kept even when they become empty.
    ///
    /// # Errors
    /// [`UnmapError::Unaligned`] or [`UnmapError::NotMapped`].
    pub fn unmap_one(&self, va: VirtualAddress) -> Result<PhysicalPage, UnmapError> {
        if !va.is_page_aligned() {
            return Err(UnmapError::Unaligned(va));
        }
        let (di, ti) = split_indices(va);
        let table = self
            .pd_mut()
            .get(di)
            .next_table()
            .ok_or(UnmapError::NotMapped(va))?;
        let pt = self.pt_mut(table);
        let (frame, _) = pt.get(ti).page_4k().ok_or(UnmapError::NotMapped(va))?;
        pt.set(ti, PtEntry::zero());
        Ok(frame)
    }

    /// The present leaf covering `va`, with its flags.
    #[must_use]
    pub fn leaf(&self, va: VirtualAddress) -> Option<(PhysicalPage, PageEntryBits)> {
        let (di, ti) = split_indices(va);
        let table = self.pd_mut().get(di).next_table()?;
        self.pt_mut(table).get(ti).page_4k()
    }

    /// Translate a `VirtualAddress` to a `PhysicalAddress` if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let (frame, _) = self.leaf(va)?;
        Some(frame.join(va.offset()))
    }

    /// `true` only if every page covering `[va, va + len)` is present and
    /// both its PDE and PTE grant every permission bit in `required`.
    ///
    /// An empty range or one that wraps past 4 GiB is rejected.
    #[must_use]
    pub fn range_has_flags(&self, va: VirtualAddress, len: u32, required: PageEntryBits) -> bool {
        if len == 0 {
            return false;
        }
        let Some(last) = va.as_u32().checked_add(len - 1) else {
            return false;
        };

        let required = required.with_present(true);
        let pd: &PageDirectory = self.pd_mut();
        (align_down(va.as_u32())..=align_down(last)).step_by(PAGE_SIZE as usize).all(|page| {
            let (di, ti) = split_indices(VirtualAddress::new(page));
            let pde = pd.get(di);
            let Some(table) = pde.next_table() else {
                return false;
            };
            pde.flags().grants(required) && self.pt_mut(table).get(ti).flags().grants(required)
        })
    }

    /// Copy every directory entry of `kernel` into this directory.
    ///
    /// The page tables themselves are shared, not duplicated.
    pub fn copy_kernel_entries_from(&self, kernel: &Self) {
        if self.root == kernel.root {
            return;
        }
        let src: &PageDirectory = kernel.pd_mut();
        let dst = self.pd_mut();
        for i in DirIndex::all() {
            dst.set(i, src.get(i));
        }
    }

    /// `true` if the page table covering `va` is also linked from `kernel`.
    ///
    /// Sharing is decided by the table frame; the entry flags may differ.
    #[must_use]
    pub fn shares_table_with(&self, kernel: &Self, va: VirtualAddress) -> bool {
        let (di, _) = split_indices(va);
        shared_slot(self.pd_mut().get(di), kernel.pd_mut().get(di))
    }

    /// Every present leaf in directory slots that are **not** shared with
    /// `kernel`, in ascending VA order.
    pub fn private_leaves(
        &self,
        kernel: &Self,
    ) -> impl Iterator<Item = (VirtualAddress, PhysicalPage, PageEntryBits)> + use<'m, M> {
        let mapper: &'m M = self.mapper;
        let pd: &'m PageDirectory = mapper.pd_mut(self.root);
        let kpd: &'m PageDirectory = kernel.mapper.pd_mut(kernel.root);
        let shared = self.root == kernel.root;
        DirIndex::all()
            .filter(move |_| !shared)
            .filter_map(move |di| {
                let own = pd.get(di);
                let table = own.next_table()?;
                (!shared_slot(own, kpd.get(di))).then_some((di, table))
            })
            .flat_map(move |(di, table)| {
                let pt: &'m PageTable = mapper.pt_mut(table);
                TableIndex::all().filter_map(move |ti| {
                    let (frame, flags) = pt.get(ti).page_4k()?;
                    Some((leaf_address(di, ti), frame, flags))
                })
            })
    }

    /// Unlink every page table that is private to this space (not shared
    /// with `kernel`) and pass each of its present leaf frames, then the
    /// table itself, to `visit`. Shared slots are left as they are. The
    /// directory itself stays allocated.
    ///
    /// Returns the number of tables released.
    pub fn drain_private(&self, kernel: &Self, mut visit: impl FnMut(Drained)) -> usize {
        if self.root == kernel.root {
            return 0;
        }
        let pd = self.pd_mut();
        let kpd: &PageDirectory = kernel.pd_mut();
        let mut released = 0;
        for di in DirIndex::all() {
            let own = pd.get(di);
            let Some(table) = own.next_table() else {
                continue;
            };
            if shared_slot(own, kpd.get(di)) {
                continue;
            }
            let pt = self.pt_mut(table);
            for ti in TableIndex::all() {
                if let Some((frame, _)) = pt.get(ti).page_4k() {
                    visit(Drained::Leaf(leaf_address(di, ti), frame));
                    pt.set(ti, PtEntry::zero());
                }
            }
            pd.set(di, PdEntry::zero());
            visit(Drained::Table(table));
            released += 1;
        }
        released
    }
}

/// Both entries link the same page table.
fn shared_slot(own: PdEntry, kernel: PdEntry) -> bool {
    own.next_table().is_some() && own.next_table() == kernel.next_table()
}

/// First address of the page selected by `(di, ti)`.
#[allow(clippy::cast_possible_truncation)]
const fn leaf_address(di: DirIndex, ti: TableIndex) -> VirtualAddress {
    VirtualAddress::new(di.base().as_u32() | ((ti.as_usize() as u32) << 12))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BumpAlloc, TestPhys};

    fn fresh(phys: &TestPhys, alloc: &mut BumpAlloc) -> RootPage {
        let root = alloc.alloc_4k().unwrap();
        phys.zero_frame(root);
        root
    }

    #[test]
    fn map_one_creates_table_and_leaf() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let root = fresh(&phys, &mut alloc);
        let aspace = AddressSpace::from_root(&phys, root);

        let va = VirtualAddress::new(0x0400_3000);
        let pa = PhysicalAddress::new(0x0000_5000);
        let outcome = aspace
            .map_one(&mut alloc, va, pa, PageEntryBits::user_rw())
            .unwrap();
        assert!(outcome.new_table);

        let pde = phys.pd_mut(root).get(DirIndex::from(va));
        assert!(pde.is_present());
        assert!(pde.flags().user_access());
        assert_eq!(aspace.query(va.checked_add(0x42).unwrap()), Some(pa + 0x42));

        let again = aspace
            .map_one(&mut alloc, va.checked_add(0x1000).unwrap(), pa, PageEntryBits::user_ro())
            .unwrap();
        assert!(!again.new_table);
    }

    #[test]
    fn map_rejects_unaligned_and_existing() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let aspace = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        let va = VirtualAddress::new(0x0040_0000);

        assert!(matches!(
            aspace.map_one(&mut alloc, VirtualAddress::new(0x0040_0010), PhysicalAddress::new(0x1000), PageEntryBits::kernel_rw()),
            Err(MapError::Unaligned { .. })
        ));
        assert!(matches!(
            aspace.map_one(&mut alloc, va, PhysicalAddress::new(0x1001), PageEntryBits::kernel_rw()),
            Err(MapError::Unaligned { .. })
        ));
        assert_eq!(aspace.query(va), None);

        aspace
            .map_one(&mut alloc, va, PhysicalAddress::new(0x3000), PageEntryBits::kernel_rw())
            .unwrap();
        assert_eq!(
            aspace.map_one(&mut alloc, va, PhysicalAddress::new(0x4000), PageEntryBits::user_rw()),
            Err(MapError::AlreadyMapped(va))
        );
        assert_eq!(aspace.query(va), Some(PhysicalAddress::new(0x3000)));
    }

    #[test]
    fn map_reports_exhaustion() {
        let phys = TestPhys::with_frames(1);
        let mut alloc = BumpAlloc::new(0, 1);
        let aspace = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        assert_eq!(
            aspace.map_one(&mut alloc, VirtualAddress::new(0), PhysicalAddress::new(0), PageEntryBits::kernel_rw()),
            Err(MapError::OutOfMemory)
        );
    }

    #[test]
    fn unmap_then_query_is_unmapped() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let aspace = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        let va = VirtualAddress::new(0x0800_0000);

        assert_eq!(aspace.unmap_one(va), Err(UnmapError::NotMapped(va)));
        aspace
            .map_one(&mut alloc, va, PhysicalAddress::new(0x7000), PageEntryBits::user_rw())
            .unwrap();
        assert_eq!(
            aspace.unmap_one(VirtualAddress::new(0x0800_0004)),
            Err(UnmapError::Unaligned(VirtualAddress::new(0x0800_0004)))
        );
        assert_eq!(aspace.unmap_one(va), Ok(PhysicalAddress::new(0x7000).page()));
        assert_eq!(aspace.query(va), None);
        assert_eq!(aspace.unmap_one(va), Err(UnmapError::NotMapped(va)));
    }

    #[test]
    fn range_check_requires_every_page() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let aspace = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        let base = VirtualAddress::new(0x0400_0000);
        aspace
            .map_one(&mut alloc, base, PhysicalAddress::new(0x8000), PageEntryBits::user_ro())
            .unwrap();
        aspace
            .map_one(&mut alloc, VirtualAddress::new(0x0400_2000), PhysicalAddress::new(0x9000), PageEntryBits::user_ro())
            .unwrap();

        let user = PageEntryBits::user();
        assert!(aspace.range_has_flags(base, 4096, user));
        assert!(aspace.range_has_flags(VirtualAddress::new(0x0400_0ff0), 0x10, user));
        assert!(!aspace.range_has_flags(VirtualAddress::new(0x0400_0ff0), 0x11, user));
        assert!(!aspace.range_has_flags(base, 0, user));
        assert!(!aspace.range_has_flags(base, 4096, PageEntryBits::user_rw()));
        assert!(!aspace.range_has_flags(VirtualAddress::new(u32::MAX), 2, user));
    }

    #[test]
    fn kernel_entries_are_shared_and_private_tables_drained() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = BumpAlloc::new(0, 32);
        let kernel = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        kernel
            .map_one(&mut alloc, VirtualAddress::new(0x1000), PhysicalAddress::new(0x1000), PageEntryBits::kernel_rw())
            .unwrap();

        let user = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        user.copy_kernel_entries_from(&kernel);
        assert_eq!(user.query(VirtualAddress::new(0x1abc)), Some(PhysicalAddress::new(0x1abc)));
        assert!(!user.range_has_flags(VirtualAddress::new(0x1000), 1, PageEntryBits::user()));

        let leaf = PhysicalAddress::new(0xa000);
        user.map_one(&mut alloc, VirtualAddress::new(0x0400_0000), leaf, PageEntryBits::user_rw())
            .unwrap();
        assert_eq!(user.private_leaves(&kernel).count(), 1);

        let mut drained = Vec::new();
        let released = user.drain_private(&kernel, |d| drained.push(d));
        assert_eq!(released, 1);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], Drained::Leaf(VirtualAddress::new(0x0400_0000), leaf.page()));
        assert!(matches!(drained[1], Drained::Table(_)));
        assert_eq!(user.query(VirtualAddress::new(0x0400_0000)), None);
        assert_eq!(kernel.query(VirtualAddress::new(0x1000)), Some(PhysicalAddress::new(0x1000)));
    }

    #[test]
    fn user_leaf_in_a_shared_slot_keeps_the_kernel_table() {
        let phys = TestPhys::with_frames(32);
        let mut alloc = BumpAlloc::new(0, 32);
        let kernel = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        kernel
            .map_one(&mut alloc, VirtualAddress::new(0x1000), PhysicalAddress::new(0x1000), PageEntryBits::kernel_rw())
            .unwrap();
        let user = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        user.copy_kernel_entries_from(&kernel);

        let va = VirtualAddress::new(0x2000);
        assert!(user.shares_table_with(&kernel, va));
        assert!(!user.shares_table_with(&kernel, VirtualAddress::new(0x0400_0000)));

        // Sets US on the user's directory entry only; the table stays the kernel's.
        user.map_one(&mut alloc, va, PhysicalAddress::new(0xb000), PageEntryBits::user_rw())
            .unwrap();
        assert_ne!(phys.pd_mut(user.root_page()).get(DirIndex::from(va)), phys.pd_mut(kernel.root_page()).get(DirIndex::from(va)));
        assert!(user.shares_table_with(&kernel, va));
        assert_eq!(user.private_leaves(&kernel).count(), 0);

        let mut drained = Vec::new();
        assert_eq!(user.drain_private(&kernel, |d| drained.push(d)), 0);
        assert!(drained.is_empty());
        assert_eq!(kernel.query(VirtualAddress::new(0x1000)), Some(PhysicalAddress::new(0x1000)));
        assert_eq!(user.query(VirtualAddress::new(0x1000)), Some(PhysicalAddress::new(0x1000)));
    }

    #[test]
    fn range_check_reaches_the_last_page() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = BumpAlloc::new(0, 16);
        let aspace = AddressSpace::from_root(&phys, fresh(&phys, &mut alloc));
        let top = VirtualAddress::new(0xFFFF_F000);
        aspace
            .map_one(&mut alloc, top, PhysicalAddress::new(0x8000), PageEntryBits::user_rw())
            .unwrap();

        let user = PageEntryBits::user();
        assert!(aspace.range_has_flags(top, 0x1000, user));
        assert!(aspace.range_has_flags(VirtualAddress::new(0xFFFF_FFF0), 0x10, user));
        assert!(!aspace.range_has_flags(VirtualAddress::new(0xFFFF_FFF0), 0x11, user));
        assert!(!aspace.range_has_flags(VirtualAddress::new(0xFFFF_EFF0), 0x20, user));
    }
}
