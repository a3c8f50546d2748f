//! # Memory Layout

pub use kernel_memory_addresses::PAGE_SIZE;

/// End of the permanently reserved low-memory region (BIOS data, VGA, ROMs).
pub const LOW_MEMORY_END: u32 = 0x0010_0000; // 1 MiB

/// Upper bound of the kernel's identity map.
///
/// Physical memory below `min(IDENTITY_MAP_LIMIT, highest usable address)` is
/// mapped virtual == physical in every address space so page tables, the
/// frame bitmap and kernel data stay addressable across address-space switches.
pub const IDENTITY_MAP_LIMIT: u32 = 64 * 1024 * 1024;

/// Minimum number of pages identity-mapped beyond the kernel image.
pub const IDENTITY_MAP_MIN_PAGES: u32 = 4;

/// Number of 4 KiB frames in the full 32-bit physical address space.
pub const MAX_PHYSICAL_FRAMES: usize = 1 << 20;

/// Lowest virtual address a user image segment may occupy.
pub const USER_IMAGE_BASE: u32 = 0x0400_0000;

/// Top (exclusive) of every user stack.
pub const USER_STACK_TOP: u32 = 0x0410_0000;

/// Size of every user stack, in pages.
pub const USER_STACK_PAGES: u32 = 16;

/// Lowest address of every user stack.
pub const USER_STACK_BASE: u32 = USER_STACK_TOP - USER_STACK_PAGES * PAGE_SIZE;

/// Number of entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual address space covered by one page-directory entry.
pub const BYTES_PER_DIRECTORY_ENTRY: u32 = PAGE_SIZE * ENTRIES_PER_TABLE as u32;

const _: () = {
    assert!(LOW_MEMORY_END.is_multiple_of(PAGE_SIZE));
    assert!(IDENTITY_MAP_LIMIT.is_multiple_of(BYTES_PER_DIRECTORY_ENTRY));
    // User page tables must never alias the shared kernel tables.
    assert!(USER_IMAGE_BASE >= IDENTITY_MAP_LIMIT);
    assert!(USER_IMAGE_BASE.is_multiple_of(BYTES_PER_DIRECTORY_ENTRY));
    assert!(USER_STACK_BASE > USER_IMAGE_BASE);
    assert!(USER_STACK_TOP.is_multiple_of(PAGE_SIZE));
};
