//! The CPU side of [`Mmu`]: CR3 loads, CR0.PG and `invlpg`.

use kernel_memory_addresses::VirtualAddress;
use kernel_registers::cr0::Cr0;
use kernel_registers::cr3::Cr3;
use kernel_registers::tlb::invlpg;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use kernel_vmem::{Mmu, RootPage};

/// Drives the paging unit of the executing CPU. Requires CPL0.
#[derive(Debug, Default)]
pub struct HardwareMmu;

impl Mmu for HardwareMmu {
    unsafe fn load_root(&mut self, root: RootPage) {
        unsafe { Cr3::from_directory(root).store_unsafe() }
    }

    fn invalidate_page(&mut self, va: VirtualAddress) {
        // SAFETY: the kernel only runs at CPL0.
        unsafe { invlpg(va) }
    }

    unsafe fn enable_paging(&mut self) {
        unsafe {
            let cr0 = Cr0::load_unsafe();
            cr0.with_pg_paging(true).store_unsafe();
        }
    }
}
