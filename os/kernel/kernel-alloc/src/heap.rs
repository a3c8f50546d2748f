//! # Kernel Heap
//!
//! A first-fit free list over one fixed region. Free blocks are kept in
//! address order and merged with their neighbours when a block is returned.
//!
//! ```text
//! +----------------------+---------------------------+
//! | ListNode (header)    |  rest of the free block   |
//! +----------------------+---------------------------+
//! ^ block address        ^ + size_of::<ListNode>()
//! ```
//!
//! Allocated blocks carry no header; [`FreeListHeap::deallocate`] takes the
//! same [`Layout`] as the allocation. Block addresses and sizes are
//! multiples of the header size, so any split-off remainder can hold a
//! header of its own.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use kernel_sync::SpinLock;

/// Size of the kernel heap.
pub const KERNEL_HEAP_SIZE: usize = 2 * 1024 * 1024;

/// Header at the start of every **free** block.
#[repr(C)]
struct ListNode {
    /// Size of the whole block, header included.
    size: usize,
    next: *mut ListNode,
}

const GRANULE: usize = size_of::<ListNode>();

#[inline]
const fn round_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

/// Heap counters for diagnostics.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HeapStats {
    /// First managed byte.
    pub base: usize,
    /// Managed bytes.
    pub size: usize,
    pub free_bytes: usize,
    pub allocs: u64,
    pub frees: u64,
}

impl HeapStats {
    #[must_use]
    pub const fn used_bytes(&self) -> usize {
        self.size - self.free_bytes
    }
}

/// First-fit, split-and-coalesce free-list allocator.
///
/// # Invariants
/// - Free blocks do not overlap and lie within `[base, base + size)`.
/// - `head` is a sentinel; the first real block is at `head.next`.
pub struct FreeListHeap {
    head: ListNode,
    stats: HeapStats,
    initialized: bool,
}

// Safety: only used behind a SpinLock; the raw pointers are touched while locked.
unsafe impl Send for FreeListHeap {}

impl Default for FreeListHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeListHeap {
    /// An empty heap; every allocation fails until [`init`](Self::init).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: ListNode {
                size: 0,
                next: null_mut(),
            },
            stats: HeapStats {
                base: 0,
                size: 0,
                free_bytes: 0,
                allocs: 0,
                frees: 0,
            },
            initialized: false,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub const fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Manage `[start, start + size)`. The start is rounded up to the header
    /// alignment. Later calls are ignored.
    ///
    /// # Safety
    /// The range must be valid, writable and used by nothing else for as
    /// long as this heap is.
    pub unsafe fn init(&mut self, start: usize, size: usize) {
        if self.initialized {
            return;
        }
        let base = round_up(start, GRANULE);
        let size = size.saturating_sub(base - start) & !(GRANULE - 1);
        self.stats = HeapStats {
            base,
            size,
            ..HeapStats::default()
        };
        self.initialized = true;
        if size >= GRANULE {
            unsafe { self.add_free_region(base, size) };
        }
    }

    /// Number of free blocks; a fully released heap has one.
    #[must_use]
    pub fn free_blocks(&self) -> usize {
        let mut count = 0;
        let mut current = self.head.next;
        while !current.is_null() {
            count += 1;
            current = unsafe { (*current).next };
        }
        count
    }

    /// Insert `[addr, addr + size)` in address order and merge it with
    /// adjacent free blocks.
    ///
    /// # Safety
    /// The range is unused heap memory; `addr` and `size` are non-zero
    /// multiples of the header size.
    unsafe fn add_free_region(&mut self, addr: usize, size: usize) {
        debug_assert!(addr.is_multiple_of(GRANULE) && size.is_multiple_of(GRANULE) && size >= GRANULE);
        let mut prev = &raw mut self.head;
        let mut current = self.head.next;
        while !current.is_null() && (current as usize) < addr {
            prev = current;
            current = unsafe { (*current).next };
        }
        let new = addr as *mut ListNode;
        unsafe {
            new.write(ListNode { size, next: current });
            (*prev).next = new;
        }
        self.stats.free_bytes += size;
        unsafe { self.coalesce(prev) };
    }

    /// Merge the block after `prev` with its successor, then `prev` with it.
    unsafe fn coalesce(&mut self, prev: *mut ListNode) {
        let curr = unsafe { (*prev).next };
        if curr.is_null() {
            return;
        }
        let next = unsafe { (*curr).next };
        if !next.is_null() && curr as usize + unsafe { (*curr).size } == next as usize {
            unsafe {
                (*curr).size += (*next).size;
                (*curr).next = (*next).next;
            }
        }
        if !ptr::eq(prev, &raw const self.head) && prev as usize + unsafe { (*prev).size } == curr as usize {
            unsafe {
                (*prev).size += (*curr).size;
                (*prev).next = (*curr).next;
            }
        }
    }

    /// Carve `layout` out of the first free block that fits. The front and
    /// back remainders go back on the list.
    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let size = layout.size().max(1).checked_next_multiple_of(GRANULE)?;
        let align = layout.align().max(GRANULE);

        let mut prev = &raw mut self.head;
        let mut current = self.head.next;
        while !current.is_null() {
            let start = current as usize;
            let end = start + unsafe { (*current).size };
            let next = unsafe { (*current).next };
            let fit = start
                .checked_next_multiple_of(align)
                .and_then(|at| Some((at, at.checked_add(size)?)))
                .filter(|&(_, alloc_end)| alloc_end <= end);

            if let Some((at, alloc_end)) = fit {
                unsafe { (*prev).next = next };
                self.stats.free_bytes -= end - start;
                if end > alloc_end {
                    unsafe { self.add_free_region(alloc_end, end - alloc_end) };
                }
                if at > start {
                    unsafe { self.add_free_region(start, at - start) };
                }
                self.stats.allocs += 1;
                return NonNull::new(at as *mut u8);
            }
            prev = current;
            current = next;
        }
        None
    }

    /// Return a block to the heap.
    ///
    /// # Safety
    /// `ptr` came from [`allocate`](Self::allocate) on this heap with the same
    /// `layout` and is not used afterwards.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        let size = round_up(layout.size().max(1), GRANULE);
        unsafe { self.add_free_region(ptr.as_ptr() as usize, size) };
        self.stats.frees += 1;
    }
}

/// A [`FreeListHeap`] behind a [`SpinLock`], usable as `#[global_allocator]`.
pub struct LockedHeap(SpinLock<FreeListHeap>);

impl Default for LockedHeap {
    fn default() -> Self {
        Self::empty()
    }
}

impl LockedHeap {
    #[must_use]
    pub const fn empty() -> Self {
        Self(SpinLock::new(FreeListHeap::new()))
    }

    /// See [`FreeListHeap::init`].
    ///
    /// # Safety
    /// As for [`FreeListHeap::init`].
    pub unsafe fn init(&self, start: usize, size: usize) {
        self.0.with_lock(|heap| unsafe { heap.init(start, size) });
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.0.lock_irq().stats()
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.0
            .lock_irq()
            .allocate(layout)
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            unsafe { self.0.lock_irq().deallocate(ptr, layout) };
        }
    }
}
