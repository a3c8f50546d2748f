use kernel_info::segments::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::eflags::Eflags;
use kernel_syscall::{SYSCALL_VECTOR, SyscallArgs};

/// Register snapshot taken on every entry into the kernel.
///
/// Layout must match the push order of the trap stubs:
///
///   push ss, esp, eflags, cs, eip   → CPU (ss/esp only from ring 3)
///   push err_code, int_no           → stub
///   pusha                           → eax .. edi
///   push ds, es, fs, gs             → stub
///
/// With `#[repr(C)]`, memory from the stub's final `esp` looks like:
///
///   +0  gs     +4  fs     +8  es     +12 ds
///   +16 edi    +20 esi    +24 ebp    +28 esp (ignored by popa)
///   +32 ebx    +36 edx    +40 ecx    +44 eax
///   +48 int_no +52 err_code
///   +56 eip    +60 cs     +64 eflags +68 useresp +72 ss
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct TrapFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32, // arg1
    pub edx: u32, // arg3
    pub ecx: u32, // arg2
    pub eax: u32, // syscall number on entry, return value on exit
    pub int_no: u32,
    pub err_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub useresp: u32,
    pub ss: u32,
}

const _: () = assert!(size_of::<TrapFrame>() == 19 * 4);

impl TrapFrame {
    /// Frame that starts a user process at `entry` with its stack at `stack_top`.
    #[must_use]
    pub fn user_initial(entry: VirtualAddress, stack_top: VirtualAddress) -> Self {
        let data = u32::from(USER_DATA_SELECTOR);
        Self {
            gs: data,
            fs: data,
            es: data,
            ds: data,
            ss: data,
            cs: u32::from(USER_CODE_SELECTOR),
            eip: entry.as_u32(),
            useresp: stack_top.as_u32(),
            eflags: Eflags::user_initial().into_bits(),
            ..Self::default()
        }
    }

    /// A software interrupt on the system call gate.
    #[must_use]
    pub const fn is_syscall(&self) -> bool {
        self.int_no == SYSCALL_VECTOR as u32
    }

    #[must_use]
    pub const fn syscall_args(&self) -> SyscallArgs {
        SyscallArgs::new(self.eax, self.ebx, self.ecx, self.edx)
    }

    #[inline]
    pub const fn set_return(&mut self, value: u32) {
        self.eax = value;
    }

    /// The trap came from ring 3.
    #[must_use]
    pub const fn from_user(&self) -> bool {
        self.cs & 0b11 == 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn layout_matches_stub() {
        assert_eq!(offset_of!(TrapFrame, edi), 16);
        assert_eq!(offset_of!(TrapFrame, eax), 44);
        assert_eq!(offset_of!(TrapFrame, int_no), 48);
        assert_eq!(offset_of!(TrapFrame, eip), 56);
        assert_eq!(offset_of!(TrapFrame, ss), 72);
    }

    #[test]
    fn initial_user_frame() {
        let f = TrapFrame::user_initial(VirtualAddress::new(0x0400_0080), VirtualAddress::new(0x0410_0000));
        assert_eq!(f.cs, 0x1b);
        assert_eq!((f.ds, f.es, f.fs, f.gs, f.ss), (0x23, 0x23, 0x23, 0x23, 0x23));
        assert_eq!(f.eip, 0x0400_0080);
        assert_eq!(f.useresp, 0x0410_0000);
        assert_eq!(f.eflags, 0x202);
        assert_eq!(f.eax, 0);
        assert!(f.from_user());
    }

    #[test]
    fn syscall_registers() {
        let f = TrapFrame {
            eax: 4,
            ebx: 1,
            ecx: 0x0400_1000,
            edx: 12,
            int_no: 0x80,
            ..TrapFrame::default()
        };
        assert!(f.is_syscall());
        assert_eq!(f.syscall_args(), SyscallArgs::new(4, 1, 0x0400_1000, 12));
    }
}
