//! The only place that knows how the CPU changes privilege.
//!
//! The portable code builds a [`UserTransition`] or a [`KernelReturn`] and
//! never embeds the instruction sequences itself.

use crate::trap::TrapFrame;
use kernel_info::segments::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
use kernel_registers::eflags::Eflags;

/// Everything `iret` needs to start or resume user code.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UserTransition {
    pub eip: u32,
    pub esp: u32,
    pub cs: u32,
    pub ds: u32,
    pub eflags: u32,
}

impl UserTransition {
    #[must_use]
    pub const fn from_frame(frame: &TrapFrame) -> Self {
        Self {
            eip: frame.eip,
            esp: frame.useresp,
            cs: frame.cs,
            ds: frame.ds,
            eflags: frame.eflags,
        }
    }

    /// Load the user data segments and `iret` into ring 3.
    ///
    /// # Safety
    /// The user address space must be active and the selectors must name
    /// ring 3 descriptors of the loaded GDT.
    #[cfg(target_arch = "x86")]
    pub unsafe fn enter(self) -> ! {
        unsafe {
            core::arch::asm!(
                "mov ds, {ds:x}",
                "mov es, {ds:x}",
                "mov fs, {ds:x}",
                "mov gs, {ds:x}",
                "push {ds}",
                "push {esp}",
                "push {eflags}",
                "push {cs}",
                "push {eip}",
                "iretd",
                ds = in(reg) self.ds,
                esp = in(reg) self.esp,
                eflags = in(reg) self.eflags,
                cs = in(reg) self.cs,
                eip = in(reg) self.eip,
                options(noreturn)
            )
        }
    }
}

/// Where the trap path continues in ring 0 once no process can run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelReturn {
    pub eip: u32,
    pub esp: u32,
}

impl KernelReturn {
    /// Turn `frame` into a same-privilege return to `self.eip`.
    pub fn apply(self, frame: &mut TrapFrame) {
        let data = u32::from(KERNEL_DATA_SELECTOR);
        frame.cs = u32::from(KERNEL_CODE_SELECTOR);
        frame.ds = data;
        frame.es = data;
        frame.fs = data;
        frame.gs = data;
        frame.ss = data;
        frame.eflags = Eflags::from_bits(frame.eflags)
            .with_if_interrupt_enable(true)
            .into_bits();
        frame.eip = self.eip;
        frame.useresp = self.esp;
    }

    /// [`halt_forever`] on the stack the frame lives on.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn halt_on(frame: &TrapFrame) -> Self {
        Self {
            eip: (halt_forever as extern "C" fn() -> !) as usize as u32,
            esp: core::ptr::from_ref(frame) as usize as u32,
        }
    }
}

/// Idle with interrupts enabled.
pub extern "C" fn halt_forever() -> ! {
    loop {
        #[cfg(target_arch = "x86")]
        unsafe {
            core::arch::asm!("sti", "hlt", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "x86"))]
        core::hint::spin_loop();
    }
}
