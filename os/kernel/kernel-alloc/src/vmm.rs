//! Address-space manager for the kernel.
//!
//! Owns the kernel page directory, knows which directory is active and keeps
//! the paging counters. Physical frames come from whatever [`FrameAlloc`] the
//! caller passes in; page tables and user frames are taken from below the
//! identity-map limit when possible so the kernel can reach them through the
//! [`PhysMapper`].
//!
//! # Example
//! ```ignore
//! use kernel_alloc::{frame_alloc::BitmapFrameAlloc, phys_mapper::IdentityPhysMapper, mmu::HardwareMmu, vmm::Vmm};
//! let mut pmm = BitmapFrameAlloc::new();
//! pmm.init(&boot)?;
//! let mut vmm = Vmm::init(IdentityPhysMapper, HardwareMmu, &boot, &mut pmm)?;
//! let space = vmm.create_address_space(&mut pmm)?;
//! ```

use kernel_info::boot::{BootInfo, BootInfoError};
use kernel_info::memory::{IDENTITY_MAP_LIMIT, IDENTITY_MAP_MIN_PAGES};
use kernel_memory_addresses::{
    PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage, align_down,
    align_up_u64,
};
use kernel_vmem::{
    AddressSpace, Drained, FrameAlloc, MapError, Mmu, PageEntryBits, PhysMapper, RootPage, UnmapError,
};
use log::{debug, info};

/// Paging counters for diagnostics.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PagingStats {
    pub enabled: bool,
    /// Active page directory.
    pub directory: RootPage,
    /// End of the identity-mapped region (exclusive).
    pub identity_limit: PhysicalAddress,
    pub mapped_pages: u32,
    pub page_tables: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmmError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid boot information: {0}")]
    BootInfo(#[from] BootInfoError),
    #[error(transparent)]
    Map(MapError),
    #[error(transparent)]
    Unmap(#[from] UnmapError),
    #[error("access to unmapped memory at {0}")]
    Unmapped(VirtualAddress),
    #[error("invalid range")]
    InvalidRange,
    #[error("{0} lies in a page table shared with the kernel")]
    KernelShared(VirtualAddress),
}

impl From<MapError> for VmmError {
    fn from(value: MapError) -> Self {
        match value {
            MapError::OutOfMemory => Self::OutOfMemory,
            other => Self::Map(other),
        }
    }
}

/// Prefers frames below `limit`, falls back to any frame.
struct LowFirst<'a, A: FrameAlloc> {
    alloc: &'a mut A,
    limit: PhysicalAddress,
}

impl<A: FrameAlloc> FrameAlloc for LowFirst<'_, A> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage> {
        self.alloc
            .alloc_4k_below(self.limit)
            .or_else(|| self.alloc.alloc_4k())
    }

    fn alloc_4k_below(&mut self, limit: PhysicalAddress) -> Option<PhysicalPage> {
        self.alloc.alloc_4k_below(limit)
    }

    fn free_4k(&mut self, page: PhysicalPage) {
        self.alloc.free_4k(page);
    }
}

/// The address-space manager.
pub struct Vmm<M: PhysMapper, U: Mmu> {
    mapper: M,
    mmu: U,
    kernel: RootPage,
    active: RootPage,
    identity_limit: PhysicalAddress,
    mapped_pages: u32,
    page_tables: u32,
    enabled: bool,
}

/// End of the identity map for this boot: `min(64 MiB, highest usable)`, but
/// never below the first page after the kernel image (and never below four pages).
#[must_use]
pub fn identity_limit_for(boot: &BootInfo<'_>) -> PhysicalAddress {
    let floor = u64::from(IDENTITY_MAP_MIN_PAGES * PAGE_SIZE);
    let kernel_end = align_up_u64(boot.kernel_image.end).max(floor);
    let minimum = (kernel_end + u64::from(PAGE_SIZE)).max(floor);

    let mut upper = u64::from(IDENTITY_MAP_LIMIT);
    let usable_top = boot.highest_usable();
    if usable_top != 0 && usable_top < upper {
        upper = usable_top;
    }

    #[allow(clippy::cast_possible_truncation)]
    let limit = upper.max(minimum).min(u64::from(u32::MAX)) as u32;
    PhysicalAddress::new(align_down(limit))
}

impl<M: PhysMapper, U: Mmu> Vmm<M, U> {
    /// Build the kernel directory, identity-map low memory, load it and
    /// enable paging.
    ///
    /// # Errors
    /// - The boot information is unusable.
    /// - No frame is left for the directory or its page tables.
    pub fn init<A: FrameAlloc>(
        mapper: M,
        mmu: U,
        boot: &BootInfo<'_>,
        alloc: &mut A,
    ) -> Result<Self, VmmError> {
        boot.validate()?;
        let identity_limit = identity_limit_for(boot);

        let mut low = LowFirst {
            alloc,
            limit: identity_limit,
        };
        let kernel = low
            .alloc
            .alloc_4k_below(identity_limit)
            .ok_or(VmmError::OutOfMemory)?;
        mapper.pd_mut(kernel).zero();

        let mut vmm = Self {
            mapper,
            mmu,
            kernel,
            active: kernel,
            identity_limit,
            mapped_pages: 0,
            page_tables: 0,
            enabled: false,
        };

        let space = AddressSpace::from_root(&vmm.mapper, kernel);
        for page in VirtualPage::range(VirtualAddress::new(0), VirtualAddress::new(identity_limit.as_u32())) {
            let va = page.base();
            let pa = PhysicalAddress::new(va.as_u32());
            let outcome = space.map_one(&mut low, va, pa, PageEntryBits::kernel_rw())?;
            vmm.mapped_pages += 1;
            vmm.page_tables += u32::from(outcome.new_table);
        }

        // SAFETY: the directory identity-maps the kernel image and its stack.
        unsafe {
            vmm.mmu.load_root(kernel);
            vmm.mmu.enable_paging();
        }
        vmm.enabled = true;

        info!(
            "enabled, identity-mapped {:#x} bytes ({} pages, {} tables)",
            identity_limit.as_u32(),
            vmm.mapped_pages,
            vmm.page_tables
        );
        Ok(vmm)
    }

    #[inline]
    fn space(&self, directory: RootPage) -> AddressSpace<'_, M> {
        AddressSpace::from_root(&self.mapper, directory)
    }

    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[inline]
    pub const fn mmu(&self) -> &U {
        &self.mmu
    }

    #[inline]
    pub const fn kernel_directory(&self) -> RootPage {
        self.kernel
    }

    #[inline]
    pub const fn active_directory(&self) -> RootPage {
        self.active
    }

    #[inline]
    pub const fn identity_limit(&self) -> PhysicalAddress {
        self.identity_limit
    }

    /// Reject `va` in a process directory if its page table belongs to the kernel.
    fn check_private(&self, directory: RootPage, va: VirtualAddress) -> Result<(), VmmError> {
        if directory != self.kernel && self.space(directory).shares_table_with(&self.space(self.kernel), va) {
            return Err(VmmError::KernelShared(va));
        }
        Ok(())
    }

    /// Map `va → pa` in `directory`.
    ///
    /// # Errors
    /// - Unaligned addresses, an existing mapping, or no frame for a page table.
    /// - [`VmmError::KernelShared`] if `directory` is not the kernel's and
    ///   `va` falls in a slot whose page table the kernel owns.
    pub fn map_in<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        directory: RootPage,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), VmmError> {
        self.check_private(directory, va)?;
        let mut low = LowFirst {
            alloc,
            limit: self.identity_limit,
        };
        let outcome = self.space(directory).map_one(&mut low, va, pa, flags)?;
        self.mapped_pages += 1;
        self.page_tables += u32::from(outcome.new_table);
        self.mmu.invalidate_page(va);
        Ok(())
    }

    /// Map `va → pa` in the active directory.
    ///
    /// # Errors
    /// See [`map_in`](Self::map_in).
    pub fn map<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), VmmError> {
        self.map_in(alloc, self.active, va, pa, flags)
    }

    /// Remove the mapping of `va` in `directory` and return its frame.
    /// The frame itself is not freed.
    ///
    /// # Errors
    /// Unaligned or unmapped `va`, or `va` in a kernel-owned table as for
    /// [`map_in`](Self::map_in).
    pub fn unmap_in(
        &mut self,
        directory: RootPage,
        va: VirtualAddress,
    ) -> Result<PhysicalPage, VmmError> {
        self.check_private(directory, va)?;
        let frame = self.space(directory).unmap_one(va)?;
        self.mapped_pages = self.mapped_pages.saturating_sub(1);
        self.mmu.invalidate_page(va);
        Ok(frame)
    }

    /// Remove the mapping of `va` in the active directory.
    ///
    /// # Errors
    /// See [`unmap_in`](Self::unmap_in).
    pub fn unmap(&mut self, va: VirtualAddress) -> Result<PhysicalPage, VmmError> {
        self.unmap_in(self.active, va)
    }

    #[must_use]
    pub fn resolve_in(&self, directory: RootPage, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.space(directory).query(va)
    }

    #[must_use]
    pub fn resolve(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.resolve_in(self.active, va)
    }

    /// The present leaf covering `va` in `directory`, with its flags.
    #[must_use]
    pub fn leaf_in(
        &self,
        directory: RootPage,
        va: VirtualAddress,
    ) -> Option<(PhysicalPage, PageEntryBits)> {
        self.space(directory).leaf(va)
    }

    /// See [`AddressSpace::range_has_flags`]; checks the active directory.
    #[must_use]
    pub fn range_has_flags(&self, va: VirtualAddress, len: u32, flags: PageEntryBits) -> bool {
        self.range_has_flags_in(self.active, va, len, flags)
    }

    #[must_use]
    pub fn range_has_flags_in(
        &self,
        directory: RootPage,
        va: VirtualAddress,
        len: u32,
        flags: PageEntryBits,
    ) -> bool {
        self.space(directory).range_has_flags(va, len, flags)
    }

    /// Allocate a directory that shares every kernel page table and has no
    /// user mappings.
    ///
    /// # Errors
    /// [`VmmError::OutOfMemory`] if no frame is left.
    pub fn create_address_space<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
    ) -> Result<RootPage, VmmError> {
        let mut low = LowFirst {
            alloc,
            limit: self.identity_limit,
        };
        let root = low.alloc_4k().ok_or(VmmError::OutOfMemory)?;
        let space = self.space(root);
        space.clear();
        space.copy_kernel_entries_from(&self.space(self.kernel));
        debug!("created address space {root}");
        Ok(root)
    }

    /// Make `directory` the active one.
    pub fn switch(&mut self, directory: RootPage) {
        self.active = directory;
        // SAFETY: every directory shares the kernel entries, so the executing
        // code stays mapped.
        unsafe { self.mmu.load_root(directory) }
    }

    pub fn switch_to_kernel(&mut self) {
        self.switch(self.kernel);
    }

    /// Every present user-region leaf of `directory` (slots not shared with
    /// the kernel), in ascending address order.
    pub fn private_leaves(
        &self,
        directory: RootPage,
    ) -> impl Iterator<Item = (VirtualAddress, PhysicalPage, PageEntryBits)> + '_ {
        self.space(directory)
            .private_leaves(&self.space(self.kernel))
    }

    /// Return every private frame of `directory` to `alloc`: user frames,
    /// page tables that are not shared with the kernel, and the directory.
    ///
    /// The kernel directory is never released. If `directory` is active, the
    /// kernel directory is activated first.
    pub fn release_address_space<A: FrameAlloc>(&mut self, alloc: &mut A, directory: RootPage) {
        if directory == self.kernel {
            return;
        }
        if directory == self.active {
            self.switch_to_kernel();
        }

        let mut frames = 0u32;
        let mut tables = 0u32;
        let kernel = self.space(self.kernel);
        self.space(directory).drain_private(&kernel, |drained| match drained {
            Drained::Leaf(_, frame) => {
                alloc.free_4k(frame);
                frames += 1;
            }
            Drained::Table(table) => {
                alloc.free_4k(table);
                tables += 1;
            }
        });
        alloc.free_4k(directory);

        self.mapped_pages = self.mapped_pages.saturating_sub(frames);
        self.page_tables = self.page_tables.saturating_sub(tables);
        debug!("released address space {directory}: {frames} frames, {tables} tables");
    }

    /// A zeroed frame for user memory, preferably below the identity limit.
    pub fn alloc_user_frame<A: FrameAlloc>(&self, alloc: &mut A) -> Option<PhysicalPage> {
        let mut low = LowFirst {
            alloc,
            limit: self.identity_limit,
        };
        let frame = low.alloc_4k()?;
        self.mapper.zero_frame(frame);
        Some(frame)
    }

    /// Copy `bytes` to `va` in `directory`, page by page through the mapper.
    ///
    /// # Errors
    /// [`VmmError::Unmapped`] at the first unmapped page; earlier pages are
    /// already written. [`VmmError::InvalidRange`] if the range wraps.
    pub fn write_bytes(
        &self,
        directory: RootPage,
        va: VirtualAddress,
        bytes: &[u8],
    ) -> Result<(), VmmError> {
        self.for_each_chunk(directory, va, bytes.len(), |frame, off, done, len| {
            frame[off..off + len].copy_from_slice(&bytes[done..done + len]);
        })
    }

    /// Fill `buf` from `va` in `directory`.
    ///
    /// # Errors
    /// See [`write_bytes`](Self::write_bytes).
    pub fn read_bytes(
        &self,
        directory: RootPage,
        va: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<(), VmmError> {
        let len = buf.len();
        self.for_each_chunk(directory, va, len, |frame, off, done, n| {
            buf[done..done + n].copy_from_slice(&frame[off..off + n]);
        })
    }

    /// Copy the contents of one frame into another.
    pub fn copy_frame(&self, from: PhysicalPage, to: PhysicalPage) {
        if from == to {
            return;
        }
        let src: &[u8; PAGE_SIZE as usize] = self.mapper.frame_bytes_mut(from);
        self.mapper.frame_bytes_mut(to).copy_from_slice(src);
    }

    fn for_each_chunk(
        &self,
        directory: RootPage,
        va: VirtualAddress,
        len: usize,
        mut f: impl FnMut(&mut [u8; PAGE_SIZE as usize], usize, usize, usize),
    ) -> Result<(), VmmError> {
        let len32 = u32::try_from(len).map_err(|_| VmmError::InvalidRange)?;
        if va.checked_add(len32).is_none() {
            return Err(VmmError::InvalidRange);
        }

        let space = self.space(directory);
        let mut done = 0usize;
        while done < len {
            #[allow(clippy::cast_possible_truncation)]
            let at = VirtualAddress::new(va.as_u32() + done as u32);
            let (frame, _) = space.leaf(at).ok_or(VmmError::Unmapped(at))?;
            let off = at.offset() as usize;
            let n = (PAGE_SIZE as usize - off).min(len - done);
            f(self.mapper.frame_bytes_mut(frame), off, done, n);
            done += n;
        }
        Ok(())
    }

    #[must_use]
    pub const fn stats(&self) -> PagingStats {
        PagingStats {
            enabled: self.enabled,
            directory: self.active,
            identity_limit: self.identity_limit,
            mapped_pages: self.mapped_pages,
            page_tables: self.page_tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_alloc::BitmapFrameAlloc;
    use kernel_info::boot::{MemoryRegion, PhysRange};
    use kernel_vmem::testing::{RecordingMmu, TestPhys};

    const MIB: u32 = 0x10_0000;

    struct Fixture {
        pmm: Box<BitmapFrameAlloc>,
        vmm: Vmm<TestPhys, RecordingMmu>,
    }

    fn boot_with(top: u32) -> Fixture {
        let regions = [MemoryRegion::usable(0, u64::from(top))];
        let boot = BootInfo::new(&regions, PhysRange::new(u64::from(MIB), u64::from(MIB) + 0x1_0000));
        let mut pmm = Box::new(BitmapFrameAlloc::new());
        pmm.init(&boot).unwrap();
        let vmm = Vmm::init(TestPhys::with_bytes(top), RecordingMmu::default(), &boot, &mut *pmm).unwrap();
        Fixture { pmm, vmm }
    }

    #[test]
    fn identity_limit_follows_usable_memory() {
        let small = [MemoryRegion::usable(0, 8 * u64::from(MIB))];
        let boot = BootInfo::new(&small, PhysRange::new(0x10_0000, 0x11_0000));
        assert_eq!(identity_limit_for(&boot).as_u32(), 8 * MIB);

        let large = [MemoryRegion::usable(0, 512 * u64::from(MIB))];
        let boot = BootInfo::new(&large, PhysRange::new(0x10_0000, 0x11_0000));
        assert_eq!(identity_limit_for(&boot).as_u32(), 64 * MIB);

        let tiny = [MemoryRegion::usable(0, 0x1000)];
        let boot = BootInfo::new(&tiny, PhysRange::new(0, 0x800));
        assert_eq!(identity_limit_for(&boot).as_u32(), 5 * PAGE_SIZE);
    }

    #[test]
    fn init_identity_maps_and_enables_paging() {
        let f = boot_with(4 * MIB);
        let stats = f.vmm.stats();
        assert!(stats.enabled);
        assert_eq!(stats.identity_limit.as_u32(), 4 * MIB);
        assert_eq!(stats.mapped_pages, 1024);
        assert_eq!(stats.page_tables, 1);
        assert_eq!(f.vmm.mmu().active, Some(f.vmm.kernel_directory()));
        assert!(f.vmm.mmu().paging_enabled);

        let va = VirtualAddress::new(0x0012_3456);
        assert_eq!(f.vmm.resolve(va), Some(PhysicalAddress::new(0x0012_3456)));
        assert_eq!(f.vmm.resolve(VirtualAddress::new(4 * MIB)), None);
        assert!(!f.vmm.range_has_flags(va, 16, PageEntryBits::user()));
        assert!(f.vmm.range_has_flags(va, 16, PageEntryBits::kernel_rw()));
    }

    #[test]
    fn map_counts_and_invalidates() {
        let mut f = boot_with(4 * MIB);
        let frame = f.vmm.alloc_user_frame(&mut *f.pmm).unwrap();
        let va = VirtualAddress::new(0x0400_0000);

        f.vmm.map(&mut *f.pmm, va, frame.base(), PageEntryBits::user_rw()).unwrap();
        assert_eq!(f.vmm.stats().mapped_pages, 1025);
        assert_eq!(f.vmm.stats().page_tables, 2);
        assert_eq!(f.vmm.mmu().invalidations.last(), Some(&va));
        assert_eq!(
            f.vmm.map(&mut *f.pmm, va, frame.base(), PageEntryBits::user_rw()),
            Err(VmmError::Map(MapError::AlreadyMapped(va)))
        );

        assert_eq!(f.vmm.unmap(va), Ok(frame));
        assert_eq!(f.vmm.resolve(va), None);
        assert_eq!(f.vmm.stats().mapped_pages, 1024);
    }

    #[test]
    fn address_spaces_share_kernel_tables_only() {
        let mut f = boot_with(4 * MIB);
        let a = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        let b = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        assert_eq!(f.vmm.private_leaves(a).count(), 0);

        let kernel = f.vmm.kernel_directory();
        let low = VirtualAddress::new(0x1000);
        assert_eq!(
            f.vmm.mapper().pd_mut(a).get(kernel_vmem::page_table::pd::DirIndex::from(low)),
            f.vmm.mapper().pd_mut(kernel).get(kernel_vmem::page_table::pd::DirIndex::from(low))
        );
        assert!(!f.vmm.range_has_flags_in(a, low, 4096, PageEntryBits::user()));

        let frame = f.vmm.alloc_user_frame(&mut *f.pmm).unwrap();
        let va = VirtualAddress::new(0x0400_0000);
        f.vmm.map_in(&mut *f.pmm, a, va, frame.base(), PageEntryBits::user_rw()).unwrap();
        assert!(f.vmm.range_has_flags_in(a, va, 4096, PageEntryBits::user_rw()));
        assert_eq!(f.vmm.resolve_in(b, va), None);
        assert_eq!(f.vmm.resolve_in(kernel, va), None);
    }

    #[test]
    fn bytes_cross_page_boundaries() {
        let mut f = boot_with(4 * MIB);
        let space = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        for page in [0x0400_0000, 0x0400_1000] {
            let frame = f.vmm.alloc_user_frame(&mut *f.pmm).unwrap();
            f.vmm
                .map_in(&mut *f.pmm, space, VirtualAddress::new(page), frame.base(), PageEntryBits::user_rw())
                .unwrap();
        }

        let at = VirtualAddress::new(0x0400_0ffe);
        f.vmm.write_bytes(space, at, b"hello").unwrap();
        let mut back = [0u8; 5];
        f.vmm.read_bytes(space, at, &mut back).unwrap();
        assert_eq!(&back, b"hello");

        assert_eq!(
            f.vmm.write_bytes(space, VirtualAddress::new(0x0400_1ffe), b"abc"),
            Err(VmmError::Unmapped(VirtualAddress::new(0x0400_2000)))
        );
    }

    #[test]
    fn release_returns_every_private_frame() {
        let mut f = boot_with(4 * MIB);
        let before = f.pmm.stats().free;
        let space = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        for page in [0x0400_0000, 0x0400_1000, 0x0800_0000] {
            let frame = f.vmm.alloc_user_frame(&mut *f.pmm).unwrap();
            f.vmm
                .map_in(&mut *f.pmm, space, VirtualAddress::new(page), frame.base(), PageEntryBits::user_rw())
                .unwrap();
        }
        f.vmm.switch(space);
        assert_eq!(f.pmm.stats().free, before - 6);

        f.vmm.release_address_space(&mut *f.pmm, space);
        assert_eq!(f.pmm.stats().free, before);
        assert_eq!(f.vmm.active_directory(), f.vmm.kernel_directory());
        assert_eq!(f.vmm.stats().mapped_pages, 1024);
        assert_eq!(f.vmm.stats().page_tables, 1);

        let kernel = f.vmm.kernel_directory();
        f.vmm.release_address_space(&mut *f.pmm, kernel);
        assert_eq!(f.pmm.stats().free, before);
    }

    #[test]
    fn process_cannot_map_into_a_partly_filled_kernel_table() {
        // The identity map ends at 6 MiB, halfway through the second table.
        let mut f = boot_with(6 * MIB);
        let kernel = f.vmm.kernel_directory();
        let a = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        let b = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        let frame = f.vmm.alloc_user_frame(&mut *f.pmm).unwrap();
        let va = VirtualAddress::new(0x0070_0000);

        assert_eq!(
            f.vmm.map_in(&mut *f.pmm, a, va, frame.base(), PageEntryBits::user_rw()),
            Err(VmmError::KernelShared(va))
        );
        assert_eq!(f.vmm.resolve_in(a, va), None);
        assert_eq!(f.vmm.resolve_in(b, va), None);
        assert_eq!(f.vmm.resolve_in(kernel, va), None);
        assert_eq!(
            f.vmm.unmap_in(a, VirtualAddress::new(0x0040_0000)),
            Err(VmmError::KernelShared(VirtualAddress::new(0x0040_0000)))
        );

        // The kernel may still extend its own table.
        f.vmm.map_in(&mut *f.pmm, kernel, va, frame.base(), PageEntryBits::kernel_rw()).unwrap();
        assert_eq!(f.vmm.resolve_in(a, va), Some(frame.base()));
    }

    #[test]
    fn release_keeps_the_kernel_identity_map() {
        let mut f = boot_with(6 * MIB);
        let kernel = f.vmm.kernel_directory();
        let a = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        let b = f.vmm.create_address_space(&mut *f.pmm).unwrap();
        let after_b = f.pmm.stats().free;

        let frame = f.vmm.alloc_user_frame(&mut *f.pmm).unwrap();
        f.vmm
            .map_in(&mut *f.pmm, a, VirtualAddress::new(0x0400_0000), frame.base(), PageEntryBits::user_rw())
            .unwrap();
        f.vmm.release_address_space(&mut *f.pmm, a);
        assert_eq!(f.pmm.stats().free, after_b + 1);

        for va in [0x0000_1000, 0x0040_0000, 0x005f_f000] {
            let va = VirtualAddress::new(va);
            assert_eq!(f.vmm.resolve_in(kernel, va), Some(PhysicalAddress::new(va.as_u32())));
            assert_eq!(f.vmm.resolve_in(b, va), Some(PhysicalAddress::new(va.as_u32())));
        }
        assert_eq!(f.vmm.stats().page_tables, 2);
    }
}
