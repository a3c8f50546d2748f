//! Round-robin over process slots, run on every system call return.
//!
//! A process keeps the CPU until it traps in. [`Kernel::schedule`] then
//! saves the trap frame into the caller's record and overwrites the frame
//! with the context of the next runnable slot, starting just after the
//! current one.

use crate::arch::{KernelReturn, UserTransition};
use crate::console::Console;
use crate::context::Kernel;
use crate::fs::FileLookup;
use crate::process::ProcessState;
use crate::trap::TrapFrame;
use kernel_vmem::{Mmu, PhysMapper};
use log::{debug, info};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("no runnable process")]
pub struct NoRunnable;

impl<M: PhysMapper, U: Mmu, F: FileLookup, C: Console> Kernel<'_, M, U, F, C> {
    /// Save `frame` into the current process and load the next runnable one.
    ///
    /// The current process is demoted to `Runnable` only if it is still
    /// `Running`; a handler may already have made it a zombie or a waiter.
    ///
    /// # Errors
    /// [`NoRunnable`] if nothing can run. `frame` is left as it was.
    pub fn schedule(&mut self, frame: &mut TrapFrame) -> Result<(), NoRunnable> {
        if let Some(slot) = self.procs.current_slot()
            && let Some(p) = self.procs.get_mut(slot)
        {
            p.context = *frame;
            if p.state == ProcessState::Running {
                p.state = ProcessState::Runnable;
            }
        }

        let next = self.procs.next_runnable().ok_or(NoRunnable)?;
        self.enter(next, frame);
        Ok(())
    }

    /// Pick the first process to run and describe the jump into it.
    ///
    /// The chosen address space is active on return; the caller performs the
    /// transition with [`UserTransition::enter`].
    ///
    /// # Errors
    /// [`NoRunnable`] if no process was spawned.
    pub fn enter_first(&mut self) -> Result<UserTransition, NoRunnable> {
        let next = self.procs.next_runnable().ok_or(NoRunnable)?;
        let mut frame = TrapFrame::default();
        self.enter(next, &mut frame);
        info!("entering user mode at {:#010x}", frame.eip);
        Ok(UserTransition::from_frame(&frame))
    }

    /// Turn `frame` into a ring 0 return to the idle routine, on the kernel
    /// directory.
    pub fn prepare_kernel_return(&mut self, frame: &mut TrapFrame) {
        self.vmm.switch_to_kernel();
        let target = self
            .config
            .idle
            .unwrap_or_else(|| KernelReturn::halt_on(frame));
        target.apply(frame);
        debug!("no runnable process, idling at {:#010x}", frame.eip);
    }

    fn enter(&mut self, slot: usize, frame: &mut TrapFrame) {
        let Some(p) = self.procs.get_mut(slot) else {
            return;
        };
        p.state = ProcessState::Running;
        *frame = p.context;
        let (pid, directory) = (p.pid, p.directory);
        self.procs.set_current(slot);
        self.vmm.switch(directory);
        debug!("switched to pid {pid} in slot {slot}");
    }
}
