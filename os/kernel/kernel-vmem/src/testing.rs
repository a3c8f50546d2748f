//! Host-side stand-ins for physical memory, frame allocation and the MMU.
//!
//! Physical address `0` is the first byte of frame `0` of a [`TestPhys`];
//! addresses past the last frame are a test bug and panic.

use crate::{FrameAlloc, Mmu, PhysMapper, RootPage};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

/// Simulated physical RAM: `n` zeroed, 4 KiB-aligned frames.
pub struct TestPhys {
    frames: Box<[UnsafeCell<Frame>]>,
}

impl TestPhys {
    #[must_use]
    pub fn with_frames(n: usize) -> Self {
        let frames = (0..n)
            .map(|_| UnsafeCell::new(Frame([0; PAGE_SIZE as usize])))
            .collect();
        Self { frames }
    }

    /// Simulated RAM covering `[0, bytes)`.
    #[must_use]
    pub fn with_bytes(bytes: u32) -> Self {
        Self::with_frames(bytes.div_ceil(PAGE_SIZE) as usize)
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Copy `len` bytes starting at `pa` (may cross frames).
    #[must_use]
    pub fn read(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let addr = pa.as_u32() as usize + i;
                let (page, off) = (addr / PAGE_SIZE as usize, addr % PAGE_SIZE as usize);
                // SAFETY: frames are owned by `self`; reads do not overlap a live `&mut`.
                unsafe { (*self.frames[page].get()).0[off] }
            })
            .collect()
    }
}

impl PhysMapper for TestPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let (page, off) = pa.split();
        let frame = &self.frames[page.frame_index()];
        assert!(
            off as usize + size_of::<T>() <= PAGE_SIZE as usize,
            "{pa:?} does not fit a {}-byte object",
            size_of::<T>()
        );
        // SAFETY: the caller promises `T` matches the bytes at `pa`.
        unsafe { &mut *frame.get().cast::<u8>().add(off as usize).cast::<T>() }
    }
}

/// Hands out frames `[next, end)` in order. Freed frames are recorded but
/// never reused.
pub struct BumpAlloc {
    next: usize,
    end: usize,
    pub freed: Vec<PhysicalPage>,
}

impl BumpAlloc {
    /// Allocator over frame indices `[start, end)`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            next: start,
            end,
            freed: Vec::new(),
        }
    }
}

impl FrameAlloc for BumpAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage> {
        if self.next >= self.end {
            return None;
        }
        let page = PhysicalPage::from_index(self.next)?;
        self.next += 1;
        Some(page)
    }

    fn free_4k(&mut self, page: PhysicalPage) {
        self.freed.push(page);
    }
}

/// Records what the paging code asked of the CPU.
#[derive(Debug, Default)]
pub struct RecordingMmu {
    pub active: Option<RootPage>,
    pub paging_enabled: bool,
    pub loads: usize,
    pub invalidations: Vec<VirtualAddress>,
}

impl Mmu for RecordingMmu {
    unsafe fn load_root(&mut self, root: RootPage) {
        self.active = Some(root);
        self.loads += 1;
    }

    fn invalidate_page(&mut self, va: VirtualAddress) {
        self.invalidations.push(va);
    }

    unsafe fn enable_paging(&mut self) {
        self.paging_enabled = true;
    }
}
