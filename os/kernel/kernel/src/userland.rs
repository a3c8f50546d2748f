//! Building user address spaces: loading ELF images, duplicating a parent's
//! pages for `fork`, and tearing an address space down again.
//!
//! Every access to user memory goes through the [`Vmm`]; nothing here
//! depends on which directory is active.

use crate::elf::{ElfError, Ph32, elf32_view};
use crate::process::ProcessImage;
use kernel_alloc::vmm::{Vmm, VmmError};
use kernel_info::memory::{USER_IMAGE_BASE, USER_STACK_BASE, USER_STACK_TOP};
use kernel_memory_addresses::{VirtualAddress, VirtualPage, align_down, checked_align_up};
use kernel_vmem::{FrameAlloc, Mmu, PageEntryBits, PhysMapper, RootPage};
use log::{debug, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error("segment at {0} lies below the user image base")]
    BelowUserBase(VirtualAddress),
    #[error("segment at {0} overruns the image")]
    SegmentOutOfBounds(VirtualAddress),
    #[error("segment at {0} has an invalid size")]
    BadSegment(VirtualAddress),
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    Vmm(VmmError),
}

impl From<VmmError> for LoadError {
    fn from(value: VmmError) -> Self {
        match value {
            VmmError::OutOfMemory => Self::OutOfMemory,
            other => Self::Vmm(other),
        }
    }
}

/// Map the `PT_LOAD` segments of `bytes` and a user stack into `directory`.
///
/// Each segment page gets a fresh zeroed frame mapped user-accessible, and
/// writable if the segment is. Pages already mapped by an earlier segment
/// are reused. On error the directory may hold a partial image; the caller
/// releases it.
///
/// # Errors
/// See [`LoadError`].
pub fn load_image_into<M: PhysMapper, U: Mmu, A: FrameAlloc>(
    vmm: &mut Vmm<M, U>,
    alloc: &mut A,
    bytes: &[u8],
    directory: RootPage,
) -> Result<ProcessImage, LoadError> {
    let view = elf32_view(bytes)?;
    let mut lowest = u32::MAX;
    let mut highest = 0u32;

    for ph in view.iter_pt_load() {
        let (start, end) = load_segment(vmm, alloc, directory, &ph, view.segment_bytes(&ph))?;
        lowest = lowest.min(start);
        highest = highest.max(end);
    }

    let stack_base = VirtualAddress::new(USER_STACK_BASE);
    let stack_top = VirtualAddress::new(USER_STACK_TOP);
    for page in VirtualPage::range(stack_base, stack_top) {
        map_fresh(vmm, alloc, directory, page.base(), PageEntryBits::user_rw())?;
    }

    let image = ProcessImage {
        entry: view.entry(),
        lowest: VirtualAddress::new(lowest.min(USER_STACK_BASE)),
        highest: VirtualAddress::new(highest.max(USER_STACK_TOP)),
        stack_base,
        stack_top,
    };
    debug!(
        "loaded image into {directory}: entry {}, range {}..{}",
        image.entry, image.lowest, image.highest
    );
    Ok(image)
}

/// Map and fill one segment; returns its page-aligned `[start, end)`.
fn load_segment<M: PhysMapper, U: Mmu, A: FrameAlloc>(
    vmm: &mut Vmm<M, U>,
    alloc: &mut A,
    directory: RootPage,
    ph: &Ph32,
    file: Result<&[u8], ElfError>,
) -> Result<(u32, u32), LoadError> {
    let vaddr = ph.p_vaddr;
    if vaddr.as_u32() < USER_IMAGE_BASE {
        warn!("segment below user base: {vaddr}");
        return Err(LoadError::BelowUserBase(vaddr));
    }
    let file = file.map_err(|_| LoadError::SegmentOutOfBounds(vaddr))?;
    if ph.p_memsz < ph.p_filesz {
        return Err(LoadError::BadSegment(vaddr));
    }
    let end = vaddr
        .checked_add(ph.p_memsz)
        .and_then(|e| checked_align_up(e.as_u32()))
        .ok_or(LoadError::BadSegment(vaddr))?;
    let start = align_down(vaddr.as_u32());

    let flags = if ph.p_flags.write() {
        PageEntryBits::user_rw()
    } else {
        PageEntryBits::user_ro()
    };
    for page in VirtualPage::range(VirtualAddress::new(start), VirtualAddress::new(end)) {
        if vmm.leaf_in(directory, page.base()).is_none() {
            map_fresh(vmm, alloc, directory, page.base(), flags)?;
        }
    }

    vmm.write_bytes(directory, vaddr, file)?;
    let tail = VirtualAddress::new(vaddr.as_u32() + ph.p_filesz);
    zero_fill(vmm, directory, tail, (ph.p_memsz - ph.p_filesz) as usize)?;
    Ok((start, end))
}

/// Map a fresh zeroed frame at `va`; the frame is freed again if mapping fails.
fn map_fresh<M: PhysMapper, U: Mmu, A: FrameAlloc>(
    vmm: &mut Vmm<M, U>,
    alloc: &mut A,
    directory: RootPage,
    va: VirtualAddress,
    flags: PageEntryBits,
) -> Result<(), LoadError> {
    let frame = vmm.alloc_user_frame(alloc).ok_or_else(|| {
        warn!("frame allocation failed for {va}");
        LoadError::OutOfMemory
    })?;
    if let Err(e) = vmm.map_in(alloc, directory, va, frame.base(), flags) {
        alloc.free_4k(frame);
        warn!("mapping failed for {va} -> {frame}: {e}");
        return Err(e.into());
    }
    Ok(())
}

fn zero_fill<M: PhysMapper, U: Mmu>(
    vmm: &Vmm<M, U>,
    directory: RootPage,
    va: VirtualAddress,
    len: usize,
) -> Result<(), VmmError> {
    const ZEROS: [u8; 256] = [0; 256];
    let mut done = 0usize;
    while done < len {
        let n = ZEROS.len().min(len - done);
        #[allow(clippy::cast_possible_truncation)]
        let at = VirtualAddress::new(va.as_u32() + done as u32);
        vmm.write_bytes(directory, at, &ZEROS[..n])?;
        done += n;
    }
    Ok(())
}

/// Give `dst` a private copy of every present page of `src` in `[low, high)`,
/// with the same access rights. Returns the number of pages copied.
///
/// # Errors
/// [`LoadError::OutOfMemory`] if a frame or page table cannot be allocated;
/// pages copied so far stay mapped in `dst`.
pub fn clone_region<M: PhysMapper, U: Mmu, A: FrameAlloc>(
    vmm: &mut Vmm<M, U>,
    alloc: &mut A,
    src: RootPage,
    dst: RootPage,
    low: VirtualAddress,
    high: VirtualAddress,
) -> Result<usize, LoadError> {
    let mut copied = 0usize;
    for page in VirtualPage::range(low, high) {
        let va = page.base();
        let Some((from, flags)) = vmm.leaf_in(src, va) else {
            continue;
        };
        let to = vmm.alloc_user_frame(alloc).ok_or(LoadError::OutOfMemory)?;
        if let Err(e) = vmm.map_in(alloc, dst, va, to.base(), flags.permissions()) {
            alloc.free_4k(to);
            return Err(e.into());
        }
        vmm.copy_frame(from, to);
        copied += 1;
    }
    debug!("cloned {copied} pages {low}..{high} from {src} into {dst}");
    Ok(copied)
}

/// Return the user frames, private page tables and the directory itself.
pub fn release_user_region<M: PhysMapper, U: Mmu, A: FrameAlloc>(
    vmm: &mut Vmm<M, U>,
    alloc: &mut A,
    directory: RootPage,
) {
    vmm.release_address_space(alloc, directory);
}
