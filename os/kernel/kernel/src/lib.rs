//! # The Kernel Core (i386)
//!
//! Processes, scheduling and the system call boundary on top of the frame
//! allocator and address-space manager of [`kernel_alloc`].
//!
//! ## Control flow
//!
//! ```text
//!  int 0x80 ─► global::int80_entry ─► Kernel::handle_syscall
//!                                         │  switch to kernel directory
//!                                         │  handler (write, fork, exit, ...)
//!                                         │  eax = result
//!                                         ▼
//!                                     Kernel::schedule ─► next process's frame
//!                                         │ (none runnable)
//!                                         ▼
//!                                     prepare_kernel_return ─► idle routine
//! ```
//!
//! ## Modules
//!
//! - [`context`]: the [`Kernel`] object owning all kernel-wide state.
//! - [`process`]: process records and the fixed-size process table.
//! - [`scheduler`]: round-robin selection and the first entry to ring 3.
//! - [`syscall`]: dispatcher and handlers.
//! - [`userland`], [`elf`]: building user address spaces from ELF32 images.
//! - [`trap`]: the register frame the trap stubs build.
//! - [`arch`]: privilege transitions and idling.
//! - [`console`], [`fs`]: the byte sink and file lookup the handlers use.
//!
//! Everything except `global` and the instruction sequences in [`arch`]
//! runs on the host against simulated memory.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod arch;
pub mod console;
pub mod context;
pub mod elf;
pub mod fs;
#[cfg(target_arch = "x86")]
pub mod global;
pub mod process;
pub mod scheduler;
pub mod syscall;
pub mod trap;
pub mod userland;

pub use context::{Kernel, KernelConfig, KernelInitError, SpawnError};
pub use process::{MAX_PROCESSES, Pid, ProcessInfo, ProcessState};
pub use scheduler::NoRunnable;
pub use trap::TrapFrame;
