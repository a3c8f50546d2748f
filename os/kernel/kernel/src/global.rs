//! The kernel instance of the running machine and the `int 0x80` entry.
//!
//! The boot collaborator calls [`boot`] once, after it has loaded the GDT and
//! TSS and pointed IDT vector `0x80` (DPL 3) at [`int80_entry`]. From then on
//! the kernel is only reachable through the stub.

use crate::arch::{UserTransition, halt_forever};
use crate::console::QemuConsole;
use crate::context::{Kernel, KernelConfig, KernelInitError};
use crate::scheduler::NoRunnable;
use crate::trap::TrapFrame;
use initramfs::Initramfs;
use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_alloc::heap::{HeapStats, KERNEL_HEAP_SIZE, LockedHeap};
use kernel_alloc::mmu::HardwareMmu;
use kernel_alloc::phys_mapper::IdentityPhysMapper;
use kernel_info::boot::BootInfo;
use kernel_info::segments::KERNEL_DATA_SELECTOR;
use kernel_syscall::Errno;
use kernel_sync::{SpinLock, SpinLockGuard};
use log::{error, info};

pub type BootKernel = Kernel<'static, IdentityPhysMapper, HardwareMmu, Initramfs<'static>, QemuConsole>;

static FRAMES: SpinLock<BitmapFrameAlloc> = SpinLock::new(BitmapFrameAlloc::new());
static KERNEL: SpinLock<Option<BootKernel>> = SpinLock::new(None);

#[repr(align(16))]
struct HeapMem([u8; KERNEL_HEAP_SIZE]);

/// Backing storage of the kernel heap, part of the identity-mapped image.
#[unsafe(link_section = ".bss.heap")]
static mut HEAP_MEM: HeapMem = HeapMem([0; KERNEL_HEAP_SIZE]);

#[global_allocator]
static HEAP: LockedHeap = LockedHeap::empty();

/// Counters of the kernel heap.
#[must_use]
pub fn heap_stats() -> HeapStats {
    HEAP.stats()
}

/// Bring up memory and install the kernel instance.
///
/// # Errors
/// Fatal initialization errors, see [`Kernel::init`]. Calling this twice
/// fails with [`KernelInitError::AlreadyInitialized`].
pub fn init(
    boot: &BootInfo<'_>,
    files: Initramfs<'static>,
    config: KernelConfig,
) -> Result<(), KernelInitError> {
    let frames = FRAMES
        .try_lock()
        .ok_or(KernelInitError::AlreadyInitialized)?;
    let pmm = SpinLockGuard::leak(frames);

    // SAFETY: only reached once, guarded by `FRAMES`; nothing else touches `HEAP_MEM`.
    unsafe { HEAP.init((&raw mut HEAP_MEM.0).cast::<u8>() as usize, KERNEL_HEAP_SIZE) };
    let heap = HEAP.stats();
    info!("heap at {:#x}, {} KiB", heap.base, heap.size / 1024);

    let kernel = Kernel::init(boot, pmm, IdentityPhysMapper, HardwareMmu, files, QemuConsole, config)?;
    *KERNEL.lock_irq() = Some(kernel);
    Ok(())
}

/// Run `f` on the kernel instance with interrupts masked.
pub fn with_kernel<R>(f: impl FnOnce(&mut BootKernel) -> R) -> Option<R> {
    KERNEL.lock_irq().as_mut().map(f)
}

/// Enter the first runnable process.
///
/// # Errors
/// [`NoRunnable`] if nothing was spawned or the kernel is not initialized.
pub fn start_first_process() -> Result<core::convert::Infallible, NoRunnable> {
    let transition: UserTransition = with_kernel(BootKernel::enter_first).ok_or(NoRunnable)??;
    // SAFETY: `enter_first` activated the process's directory, and its
    // selectors come from `TrapFrame::user_initial`.
    unsafe { transition.enter() }
}

/// Initialize, spawn `init_path` from the initramfs and run it. Halts on
/// any failure.
pub fn boot(boot: &BootInfo<'_>, files: Initramfs<'static>, config: KernelConfig, init_path: &str) -> ! {
    if let Err(e) = init(boot, files, config) {
        error!("kernel init failed: {e}");
        halt_forever();
    }
    match with_kernel(|k| k.spawn_from_path(init_path)) {
        Some(Ok(pid)) => info!("init is pid {pid}"),
        Some(Err(e)) => error!("cannot start {init_path}: {e}"),
        None => error!("kernel vanished"),
    }
    if let Err(e) = start_first_process() {
        error!("{e}");
    }
    halt_forever()
}

extern "C" fn syscall_trap(frame: &mut TrapFrame) {
    if with_kernel(|k| k.handle_syscall(frame)).is_none() {
        frame.set_return(Errno::ENOSYS.as_return());
    }
}

/// IDT handler for vector `0x80`: builds a [`TrapFrame`] on the kernel
/// stack, hands it to the dispatcher and resumes whatever it left in it.
///
/// ```text
///   push 0, 0x80        → err_code, int_no
///   pusha               → eax .. edi
///   push ds, es, fs, gs
///   call syscall_trap(esp)
///   pop gs, fs, es, ds
///   popa
///   add esp, 8
///   iretd
/// ```
#[unsafe(naked)]
pub extern "C" fn int80_entry() {
    core::arch::naked_asm!(
        "push 0",
        "push 0x80",
        "pusha",
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "mov ax, {kdata}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "push esp",
        "call {rust}",
        "add esp, 4",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "popa",
        "add esp, 8",
        "iretd",
        kdata = const KERNEL_DATA_SELECTOR,
        rust = sym syscall_trap,
    );
}
