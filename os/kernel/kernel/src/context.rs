//! The kernel context object.
//!
//! [`Kernel`] owns every piece of kernel-wide mutable state: the frame
//! allocator, the address-space manager, the process table, the root file
//! system and the console. The trap path gets at it through
//! `global` on i386; tests build one directly on simulated
//! memory.

use crate::arch::KernelReturn;
use crate::console::Console;
use crate::fs::FileLookup;
use crate::process::{Pid, ProcessError, ProcessImage, ProcessInfo, ProcessTable};
use crate::trap::TrapFrame;
use crate::userland::{LoadError, load_image_into, release_user_region};
use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameAllocError, FrameStats};
use kernel_alloc::vmm::{PagingStats, Vmm, VmmError};
use kernel_info::boot::BootInfo;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{Mmu, PageEntryBits, PhysMapper};
use log::{info, warn};

/// Boot-time settings.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct KernelConfig {
    /// Entry and stack of the idle routine; [`halt_forever`](crate::arch::halt_forever)
    /// on the trap stack if unset.
    pub idle: Option<KernelReturn>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum KernelInitError {
    #[error("frame allocator: {0}")]
    Frames(#[from] FrameAllocError),
    #[error("paging: {0}")]
    Paging(#[from] VmmError),
    #[error("kernel already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SpawnError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("no such file")]
    NotFound,
    #[error("out of memory")]
    OutOfMemory,
    #[error("cannot load image: {0}")]
    Load(LoadError),
}

impl From<LoadError> for SpawnError {
    fn from(value: LoadError) -> Self {
        match value {
            LoadError::OutOfMemory => Self::OutOfMemory,
            other => Self::Load(other),
        }
    }
}

impl From<VmmError> for SpawnError {
    fn from(value: VmmError) -> Self {
        LoadError::from(value).into()
    }
}

pub struct Kernel<'k, M: PhysMapper, U: Mmu, F: FileLookup, C: Console> {
    pub(crate) pmm: &'k mut BitmapFrameAlloc,
    pub(crate) vmm: Vmm<M, U>,
    pub(crate) procs: ProcessTable,
    pub(crate) files: F,
    pub(crate) console: C,
    pub(crate) config: KernelConfig,
}

impl<'k, M: PhysMapper, U: Mmu, F: FileLookup, C: Console> Kernel<'k, M, U, F, C> {
    /// Bring up physical and virtual memory from the boot memory map.
    ///
    /// On return paging is enabled on the kernel directory and the process
    /// table is empty.
    ///
    /// # Errors
    /// The memory map is missing or unusable, or no frame is left for the
    /// kernel directory. Both are fatal.
    pub fn init(
        boot: &BootInfo<'_>,
        pmm: &'k mut BitmapFrameAlloc,
        mapper: M,
        mmu: U,
        files: F,
        console: C,
        config: KernelConfig,
    ) -> Result<Self, KernelInitError> {
        let frames = pmm.init(boot)?;
        let vmm = Vmm::init(mapper, mmu, boot, &mut *pmm)?;
        info!(
            "kernel up: {} of {} frames free, identity map up to {}",
            pmm.stats().free,
            frames.total,
            vmm.identity_limit()
        );
        Ok(Self {
            pmm,
            vmm,
            procs: ProcessTable::new(),
            files,
            console,
            config,
        })
    }

    /// Create a process from an ELF image. It starts `Runnable`, with no parent.
    ///
    /// The table is checked before anything is allocated; a failed load
    /// returns every frame it took.
    ///
    /// # Errors
    /// See [`SpawnError`].
    pub fn spawn_from_image(&mut self, bytes: &[u8], name: &str) -> Result<Pid, SpawnError> {
        spawn(&mut self.procs, &mut self.vmm, self.pmm, bytes, name)
    }

    /// [`spawn_from_image`](Self::spawn_from_image) with the image read from the file system.
    ///
    /// # Errors
    /// [`SpawnError::NotFound`] if `path` does not exist.
    pub fn spawn_from_path(&mut self, path: &str) -> Result<Pid, SpawnError> {
        let Some(bytes) = self.files.lookup(path) else {
            warn!("spawn {path}: not found");
            return Err(SpawnError::NotFound);
        };
        spawn(&mut self.procs, &mut self.vmm, self.pmm, bytes, path)
    }

    /// `true` only if `[ptr, ptr + len)` lies inside the current process's
    /// image bounds and every page of it is mapped user-accessible in its
    /// own address space.
    #[must_use]
    pub fn user_pointer_ok(&self, ptr: u32, len: u32) -> bool {
        let Some(p) = self.procs.current() else {
            return false;
        };
        user_range_ok(&self.vmm, p.directory, &p.image, ptr, len)
    }

    #[must_use]
    pub fn current_pid(&self) -> Option<Pid> {
        self.procs.current_pid()
    }

    /// One row per live process, in slot order.
    pub fn processes(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.procs.iter().map(|(_, p)| ProcessInfo {
            pid: p.pid,
            parent: p.parent,
            state: p.state.name(),
            name: p.name,
        })
    }

    #[must_use]
    pub const fn process_table(&self) -> &ProcessTable {
        &self.procs
    }

    #[must_use]
    pub const fn vmm(&self) -> &Vmm<M, U> {
        &self.vmm
    }

    #[must_use]
    pub const fn frame_stats(&self) -> FrameStats {
        self.pmm.stats()
    }

    #[must_use]
    pub const fn paging_stats(&self) -> PagingStats {
        self.vmm.stats()
    }

    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub const fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    #[must_use]
    pub const fn files(&self) -> &F {
        &self.files
    }
}

fn spawn<M: PhysMapper, U: Mmu>(
    procs: &mut ProcessTable,
    vmm: &mut Vmm<M, U>,
    pmm: &mut BitmapFrameAlloc,
    bytes: &[u8],
    name: &str,
) -> Result<Pid, SpawnError> {
    let slot = procs.free_slot().inspect_err(|_| {
        warn!("spawn {name}: process table full");
    })?;

    let directory = vmm.create_address_space(pmm)?;
    let image = match load_image_into(vmm, pmm, bytes, directory) {
        Ok(image) => image,
        Err(e) => {
            warn!("spawn {name}: {e}");
            release_user_region(vmm, pmm, directory);
            return Err(e.into());
        }
    };

    let context = TrapFrame::user_initial(image.entry, image.stack_top);
    let pid = procs.install(slot, name, None, directory, image, context);
    info!("spawned {name} as pid {pid} (entry {}, directory {directory})", image.entry);
    Ok(pid)
}

/// The user pointer gate for a given process.
pub(crate) fn user_range_ok<M: PhysMapper, U: Mmu>(
    vmm: &Vmm<M, U>,
    directory: kernel_vmem::RootPage,
    image: &ProcessImage,
    ptr: u32,
    len: u32,
) -> bool {
    if len == 0 {
        return false;
    }
    let Some(end) = ptr.checked_add(len) else {
        return false;
    };
    let (ptr, end) = (VirtualAddress::new(ptr), VirtualAddress::new(end));
    image.contains(ptr, end) && vmm.range_has_flags_in(directory, ptr, len, PageEntryBits::user())
}
