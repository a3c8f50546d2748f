//! # Bitmap Physical Frame Allocator
//!
//! One bit per 4 KiB frame of the 32-bit physical space; a set bit means the
//! frame is allocated (or was never usable). The bitmap is a fixed array so
//! the allocator works before any heap exists.
//!
//! ```text
//! word 0                       word 1
//! |b31 ... b1 b0|              |b31 ... b1 b0|
//!   frame 31..0                  frame 63..32
//! ```
//!
//! Allocation is first fit by ascending address. Frees of unknown or already
//! free frames are ignored.

use kernel_info::boot::{BootInfo, BootInfoError};
use kernel_info::memory::{LOW_MEMORY_END, MAX_PHYSICAL_FRAMES};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, align_up_u64};
use kernel_vmem::FrameAlloc;
use log::info;

const WORD_BITS: usize = u32::BITS as usize;
const WORDS: usize = MAX_PHYSICAL_FRAMES / WORD_BITS;

/// Frame counters reported by [`BitmapFrameAlloc::stats`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameStats {
    /// Frames tracked (up to the highest usable address).
    pub total: usize,
    /// Frames currently free.
    pub free: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("unusable boot memory map: {0}")]
    BootInfo(#[from] BootInfoError),
}

pub struct BitmapFrameAlloc {
    bitmap: [u32; WORDS],
    total: usize,
    free: usize,
}

impl Default for BitmapFrameAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapFrameAlloc {
    /// An allocator that owns nothing until [`init`](Self::init) runs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bitmap: [u32::MAX; WORDS],
            total: 0,
            free: 0,
        }
    }

    /// Build the free map from the boot memory map.
    ///
    /// Usable regions become free; the low megabyte, the kernel image and the
    /// boot modules are then reserved again, whatever the map claims.
    ///
    /// # Errors
    /// Fails if the memory map is missing or has no usable memory.
    pub fn init(&mut self, boot: &BootInfo<'_>) -> Result<FrameStats, FrameAllocError> {
        boot.validate()?;

        self.bitmap.fill(u32::MAX);
        self.free = 0;
        #[allow(clippy::cast_possible_truncation)]
        let frames = (align_up_u64(boot.highest_usable()) / u64::from(PAGE_SIZE)) as usize;
        self.total = frames.min(MAX_PHYSICAL_FRAMES);

        for region in boot.usable_regions() {
            self.mark_range(region.base, region.end(), true);
        }

        self.mark_range(0, u64::from(LOW_MEMORY_END), false);
        self.mark_range(boot.kernel_image.start, boot.kernel_image.end, false);
        for module in boot.modules {
            self.mark_range(module.start, module.end, false);
        }

        let stats = self.stats();
        info!(
            "{} frames ({} KiB) detected, {} frames free",
            stats.total,
            stats.total * PAGE_SIZE as usize / 1024,
            stats.free
        );
        Ok(stats)
    }

    /// Mark every frame touched by `[start, end)` free or allocated.
    fn mark_range(&mut self, start: u64, end: u64, free: bool) {
        if end <= start {
            return;
        }
        let page = u64::from(PAGE_SIZE);
        #[allow(clippy::cast_possible_truncation)]
        let first = (start / page).min(self.total as u64) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let last = (align_up_u64(end) / page).min(self.total as u64) as usize;

        for frame in first..last {
            match (free, self.test(frame)) {
                (true, true) => {
                    self.clear(frame);
                    self.free += 1;
                }
                (false, false) => {
                    self.set(frame);
                    self.free -= 1;
                }
                _ => {}
            }
        }
    }

    #[inline]
    const fn test(&self, frame: usize) -> bool {
        self.bitmap[frame / WORD_BITS] & (1 << (frame % WORD_BITS)) != 0
    }

    #[inline]
    const fn set(&mut self, frame: usize) {
        self.bitmap[frame / WORD_BITS] |= 1 << (frame % WORD_BITS);
    }

    #[inline]
    const fn clear(&mut self, frame: usize) {
        self.bitmap[frame / WORD_BITS] &= !(1 << (frame % WORD_BITS));
    }

    /// First free frame with index below `limit`, marked allocated.
    fn take_first_below(&mut self, limit: usize) -> Option<PhysicalPage> {
        let limit = limit.min(self.total);
        let words = limit.div_ceil(WORD_BITS);
        for (w, word) in self.bitmap[..words].iter().enumerate() {
            if *word == u32::MAX {
                continue;
            }
            let frame = w * WORD_BITS + word.trailing_ones() as usize;
            if frame >= limit {
                return None;
            }
            self.set(frame);
            self.free -= 1;
            return PhysicalPage::from_index(frame);
        }
        None
    }

    /// Allocate the lowest free frame.
    pub fn alloc(&mut self) -> Option<PhysicalPage> {
        self.take_first_below(self.total)
    }

    /// Allocate the lowest free frame that lies entirely below `limit`.
    pub fn alloc_below(&mut self, limit: PhysicalAddress) -> Option<PhysicalPage> {
        self.take_first_below((limit.as_u32() / PAGE_SIZE) as usize)
    }

    /// Free the frame containing `page`; unknown or free frames are ignored.
    pub fn free(&mut self, page: PhysicalPage) {
        let frame = page.frame_index();
        if frame >= self.total || !self.test(frame) {
            return;
        }
        self.clear(frame);
        self.free += 1;
    }

    #[must_use]
    pub fn is_allocated(&self, page: PhysicalPage) -> bool {
        let frame = page.frame_index();
        frame >= self.total || self.test(frame)
    }

    #[must_use]
    pub const fn stats(&self) -> FrameStats {
        FrameStats {
            total: self.total,
            free: self.free,
        }
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage> {
        self.alloc()
    }

    #[inline]
    fn alloc_4k_below(&mut self, limit: PhysicalAddress) -> Option<PhysicalPage> {
        self.alloc_below(limit)
    }

    #[inline]
    fn free_4k(&mut self, page: PhysicalPage) {
        self.free(page);
    }
}
