//! # Identity-mapped PhysMapper
//!
//! The kernel directory maps `[0, identity_limit)` one to one, and every
//! address space shares those entries. A physical address below the limit is
//! therefore also a valid kernel virtual address, whichever directory is
//! active.
//!
//! Page tables and user frames are preferably taken from below the limit
//! (see [`Vmm`](crate::vmm::Vmm)); frames above it are not reachable through
//! this mapper.

use kernel_vmem::PhysMapper;
use kernel_memory_addresses::PhysicalAddress;

/// [`PhysMapper`] for the identity-mapped low region.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u32() as usize as *mut T;
        // SAFETY: Caller must ensure the physical address is identity mapped.
        unsafe { &mut *va }
    }
}
