//! # Kernel Boot Information
//!
//! What the boot collaborator hands to the kernel once, before any memory
//! management exists: the physical memory map and the physical ranges that
//! must stay reserved.

use core::fmt;

/// Classification of one memory map descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryRegionKind {
    /// RAM the kernel may hand out.
    Usable,
    /// Firmware, MMIO or otherwise unavailable memory.
    Reserved,
    /// Any other firmware-specific type (ACPI reclaimable, NVS, defective, ...).
    Other(u32),
}

impl MemoryRegionKind {
    /// Multiboot-style type code: `1` is usable, everything else is not.
    #[must_use]
    pub const fn from_multiboot(kind: u32) -> Self {
        match kind {
            1 => Self::Usable,
            2 => Self::Reserved,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Usable => "usable",
            Self::Reserved => "reserved",
            Self::Other(_) => "other",
        }
    }
}

/// One memory map descriptor. Values are 64-bit since firmware may report
/// memory above 4 GiB; the kernel clamps them to the 32-bit physical space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn usable(base: u64, length: u64) -> Self {
        Self {
            base,
            length,
            kind: MemoryRegionKind::Usable,
        }
    }

    #[must_use]
    pub const fn reserved(base: u64, length: u64) -> Self {
        Self {
            base,
            length,
            kind: MemoryRegionKind::Reserved,
        }
    }

    /// Exclusive end address, saturating at `u64::MAX`.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, MemoryRegionKind::Usable)
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#012x}-{:#012x} {}",
            self.base,
            self.end(),
            self.kind.name()
        )
    }
}

/// Half-open physical range `[start, end)`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhysRange {
    pub start: u64,
    pub end: u64,
}

impl PhysRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Boot handoff consumed by the frame allocator and the paging layer.
#[derive(Copy, Clone, Debug)]
pub struct BootInfo<'a> {
    /// Physical memory map. An empty map is a fatal boot error.
    pub regions: &'a [MemoryRegion],
    /// Physical footprint of the kernel image.
    pub kernel_image: PhysRange,
    /// Boot modules (initramfs and similar) that must stay reserved.
    pub modules: &'a [PhysRange],
}

/// Fatal problems with the boot handoff.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootInfoError {
    #[error("no memory map supplied by the boot loader")]
    MissingMemoryMap,
    #[error("memory map contains no usable memory")]
    NoUsableMemory,
    #[error("invalid kernel image range {0:#x}..{1:#x}")]
    InvalidKernelImage(u64, u64),
}

impl<'a> BootInfo<'a> {
    #[must_use]
    pub const fn new(regions: &'a [MemoryRegion], kernel_image: PhysRange) -> Self {
        Self {
            regions,
            kernel_image,
            modules: &[],
        }
    }

    #[must_use]
    pub const fn with_modules(mut self, modules: &'a [PhysRange]) -> Self {
        self.modules = modules;
        self
    }

    /// Check the handoff is something the kernel can work with.
    ///
    /// # Errors
    /// See [`BootInfoError`].
    pub fn validate(&self) -> Result<(), BootInfoError> {
        if self.regions.is_empty() {
            return Err(BootInfoError::MissingMemoryMap);
        }
        if self.kernel_image.end < self.kernel_image.start {
            return Err(BootInfoError::InvalidKernelImage(
                self.kernel_image.start,
                self.kernel_image.end,
            ));
        }
        if self.highest_usable() == 0 {
            return Err(BootInfoError::NoUsableMemory);
        }
        Ok(())
    }

    /// Highest end address of any usable region, or `0` if there is none.
    #[must_use]
    pub fn highest_usable(&self) -> u64 {
        self.regions
            .iter()
            .filter(|r| r.is_usable() && r.length > 0)
            .map(MemoryRegion::end)
            .max()
            .unwrap_or(0)
    }

    /// Iterate usable regions only.
    pub fn usable_regions(&self) -> impl Iterator<Item = &MemoryRegion> + '_ {
        self.regions.iter().filter(|r| r.is_usable())
    }
}
