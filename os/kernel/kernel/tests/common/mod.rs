#![allow(dead_code, clippy::cast_possible_truncation)]

use kernel::console::Console;
use kernel::fs::FileLookup;
use kernel::{Kernel, KernelConfig, Pid, TrapFrame};
use kernel_alloc::frame_alloc::BitmapFrameAlloc;
use kernel_info::boot::{BootInfo, MemoryRegion, PhysRange};
use kernel_memory_addresses::VirtualAddress;
use kernel_syscall::Sysno;
use kernel_vmem::testing::{RecordingMmu, TestPhys};

pub const RAM: u32 = 8 * 0x10_0000;

pub const CODE: u32 = 0x0400_0000;
/// Start of the writable data segment. `CODE + 0x1000` stays unmapped.
pub const DATA: u32 = 0x0400_2000;
pub const DATA_LEN: u32 = 0x2000;
pub const MSG: &[u8] = b"hello\n";

/// Entry of [`other_program`].
pub const OTHER_ENTRY: u32 = 0x0400_8000;

#[derive(Default)]
pub struct TestConsole(pub Vec<u8>);

impl Console for TestConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }
}

#[derive(Default)]
pub struct Files(pub Vec<(&'static str, Vec<u8>)>);

impl FileLookup for Files {
    fn lookup(&self, path: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, bytes)| bytes.as_slice())
    }
}

pub type TestKernel<'k> = Kernel<'k, TestPhys, RecordingMmu, Files, TestConsole>;

pub fn frames() -> Box<BitmapFrameAlloc> {
    Box::new(BitmapFrameAlloc::new())
}

pub fn boot(pmm: &mut BitmapFrameAlloc, files: Files, config: KernelConfig) -> TestKernel<'_> {
    boot_in(pmm, RAM, files, config)
}

/// Boot with `ram` bytes of usable memory; the kernel image covers `[1 MiB, 1 MiB + 64 KiB)`.
pub fn boot_in(pmm: &mut BitmapFrameAlloc, ram: u32, files: Files, config: KernelConfig) -> TestKernel<'_> {
    let regions = [MemoryRegion::usable(0, u64::from(ram))];
    let boot = BootInfo::new(&regions, PhysRange::new(0x10_0000, 0x11_0000));
    Kernel::init(
        &boot,
        pmm,
        TestPhys::with_bytes(ram),
        RecordingMmu::default(),
        files,
        TestConsole::default(),
        config,
    )
    .unwrap()
}

/// A kernel with `bin/hello` ([`other_program`]) and a text file `etc/motd`.
pub fn kernel(pmm: &mut BitmapFrameAlloc) -> TestKernel<'_> {
    let files = Files(vec![
        ("bin/hello", other_program()),
        ("etc/motd", b"welcome\n".to_vec()),
    ]);
    boot(pmm, files, KernelConfig::default())
}

/// ELF32 image with one `PT_LOAD` per `(vaddr, flags, payload, memsz)`.
pub fn elf(entry: u32, segments: &[(u32, u32, &[u8], u32)]) -> Vec<u8> {
    const EH: usize = 52;
    const PH: usize = 32;
    let mut out = vec![0u8; EH + segments.len() * PH];
    out[0..4].copy_from_slice(b"\x7FELF");
    out[4] = 1;
    out[5] = 1;
    out[6] = 1;
    out[16..18].copy_from_slice(&2u16.to_le_bytes());
    out[18..20].copy_from_slice(&3u16.to_le_bytes());
    out[20..24].copy_from_slice(&1u32.to_le_bytes());
    out[24..28].copy_from_slice(&entry.to_le_bytes());
    out[28..32].copy_from_slice(&(EH as u32).to_le_bytes());
    out[40..42].copy_from_slice(&(EH as u16).to_le_bytes());
    out[42..44].copy_from_slice(&(PH as u16).to_le_bytes());
    out[44..46].copy_from_slice(&(segments.len() as u16).to_le_bytes());

    for (i, (vaddr, flags, payload, memsz)) in segments.iter().enumerate() {
        let offset = out.len() as u32;
        out.extend_from_slice(payload);
        let ph = EH + i * PH;
        let fields = [1, offset, *vaddr, *vaddr, payload.len() as u32, *memsz, *flags, 0x1000];
        for (j, v) in fields.iter().enumerate() {
            out[ph + j * 4..ph + j * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
    }
    out
}

/// Code at [`CODE`], [`MSG`] at the start of a two-page data segment at [`DATA`].
pub fn program() -> Vec<u8> {
    elf(CODE, &[(CODE, 5, b"\xcd\x80\xeb\xfe", 4), (DATA, 6, MSG, DATA_LEN)])
}

pub fn other_program() -> Vec<u8> {
    elf(OTHER_ENTRY, &[(OTHER_ENTRY, 5, b"\x90\xcd\x80", 3)])
}

/// Run the scheduler once with no caller, as the first entry does.
pub fn start(k: &mut TestKernel<'_>) -> TrapFrame {
    let mut frame = TrapFrame::default();
    k.schedule(&mut frame).unwrap();
    frame
}

/// Issue a system call from whoever `frame` belongs to.
pub fn syscall(k: &mut TestKernel<'_>, frame: &mut TrapFrame, number: u32, args: [u32; 3]) {
    frame.eax = number;
    frame.ebx = args[0];
    frame.ecx = args[1];
    frame.edx = args[2];
    frame.int_no = 0x80;
    k.handle_syscall(frame);
}

pub fn call(k: &mut TestKernel<'_>, frame: &mut TrapFrame, sysno: Sysno, args: [u32; 3]) {
    syscall(k, frame, sysno as u32, args);
}

pub fn pid(v: u32) -> Pid {
    Pid::new(v).unwrap()
}

/// Write into the user memory of `pid`.
pub fn poke(k: &TestKernel<'_>, pid: Pid, va: u32, bytes: &[u8]) {
    let dir = k.process_table().by_pid(pid).unwrap().directory;
    k.vmm().write_bytes(dir, VirtualAddress::new(va), bytes).unwrap();
}

/// Saved `eax` of a process that is not running.
pub fn saved_eax(k: &TestKernel<'_>, pid: Pid) -> u32 {
    k.process_table().by_pid(pid).unwrap().context.eax
}
