//! Read-only view of 32-bit little-endian i386 ELF images.
//!
//! Only what the loader needs: the entry point and the program headers.
//! Every field is read with explicit bounds checks, never by casting the blob.

use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfError {
    #[error("image too short for an ELF header")]
    TooShort,
    #[error("bad ELF magic")]
    BadMagic,
    #[error("not a 32-bit ELF image")]
    BadClass,
    #[error("not a little-endian ELF image")]
    BadEncoding,
    #[error("not an i386 image")]
    BadMachine,
    #[error("image has no program headers")]
    NoProgramHeaders,
    #[error("malformed ELF header")]
    BadHeader,
    #[error("program headers out of bounds")]
    Oob,
}

const EH_SIZE: usize = 52;
const PH_SIZE: usize = 32;
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const EM_386: u16 = 3;
pub const PT_LOAD: u32 = 1;

#[derive(Copy, Clone, Debug)]
#[allow(clippy::struct_field_names)]
pub struct Eh32 {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: VirtualAddress,
    pub e_phoff: u32,
    pub e_phentsize: u16,
    pub e_phnum: u16,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::struct_field_names)]
pub struct Ph32 {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: VirtualAddress,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: PFlags,
}

/// `Elf32_Phdr.p_flags` (SVr4): bit0=X, bit1=W, bit2=R.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool, // PF_X = 1
    #[bits(1)]
    pub write: bool, // PF_W = 2
    #[bits(1)]
    pub read: bool, // PF_R = 4
    #[bits(29)]
    __: u32,
}

#[inline]
fn le16(x: &[u8]) -> u16 {
    u16::from_le_bytes([x[0], x[1]])
}

#[inline]
fn le32(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}

pub struct ElfView<'a> {
    bytes: &'a [u8],
    pub eh: Eh32,
}

/// Validate the ELF header of `bytes` and return a view on it.
///
/// # Errors
/// See [`ElfError`].
pub fn elf32_view(bytes: &[u8]) -> Result<ElfView<'_>, ElfError> {
    use ElfError::{BadClass, BadEncoding, BadHeader, BadMachine, BadMagic, NoProgramHeaders, Oob, TooShort};
    if bytes.len() < EH_SIZE {
        return Err(TooShort);
    }

    // e_ident
    if &bytes[0..4] != b"\x7FELF" {
        return Err(BadMagic);
    }
    if bytes[4] != ELFCLASS32 {
        return Err(BadClass);
    }
    if bytes[5] != ELFDATA2LSB {
        return Err(BadEncoding);
    }

    let eh = Eh32 {
        e_type: le16(&bytes[16..18]),
        e_machine: le16(&bytes[18..20]),
        e_entry: VirtualAddress::new(le32(&bytes[24..28])),
        e_phoff: le32(&bytes[28..32]),
        e_phentsize: le16(&bytes[42..44]),
        e_phnum: le16(&bytes[44..46]),
    };

    if eh.e_machine != EM_386 {
        return Err(BadMachine);
    }
    if eh.e_phoff == 0 || eh.e_phnum == 0 {
        return Err(NoProgramHeaders);
    }
    if usize::from(eh.e_phentsize) < PH_SIZE {
        return Err(BadHeader);
    }

    let table = usize::from(eh.e_phnum)
        .checked_mul(usize::from(eh.e_phentsize))
        .ok_or(Oob)?;
    let end = (eh.e_phoff as usize).checked_add(table).ok_or(Oob)?;
    if end > bytes.len() {
        return Err(Oob);
    }

    Ok(ElfView { bytes, eh })
}

impl<'a> ElfView<'a> {
    #[must_use]
    pub const fn entry(&self) -> VirtualAddress {
        self.eh.e_entry
    }

    fn ph(&self, i: usize) -> Option<Ph32> {
        if i >= usize::from(self.eh.e_phnum) {
            return None;
        }
        let p = self.eh.e_phoff as usize + i * usize::from(self.eh.e_phentsize);
        let s = self.bytes.get(p..p + PH_SIZE)?;
        Some(Ph32 {
            p_type: le32(&s[0..4]),
            p_offset: le32(&s[4..8]),
            p_vaddr: VirtualAddress::new(le32(&s[8..12])),
            p_filesz: le32(&s[16..20]),
            p_memsz: le32(&s[20..24]),
            p_flags: PFlags::from_bits(le32(&s[24..28])),
        })
    }

    /// All program headers, in table order.
    pub fn iter_ph(&self) -> impl Iterator<Item = Ph32> + '_ {
        (0..usize::from(self.eh.e_phnum)).map_while(|i| self.ph(i))
    }

    /// Only `PT_LOAD` headers.
    pub fn iter_pt_load(&self) -> impl Iterator<Item = Ph32> + '_ {
        self.iter_ph().filter(|ph| ph.p_type == PT_LOAD)
    }

    /// The file bytes backing `ph` (`p_filesz` may be less than `p_memsz`).
    ///
    /// # Errors
    /// [`ElfError::Oob`] if the range leaves the image.
    pub fn segment_bytes(&self, ph: &Ph32) -> Result<&'a [u8], ElfError> {
        let off = ph.p_offset as usize;
        let end = off.checked_add(ph.p_filesz as usize).ok_or(ElfError::Oob)?;
        self.bytes.get(off..end).ok_or(ElfError::Oob)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal ELF32 with one program header per `(vaddr, flags, payload, memsz)`.
    pub fn build(entry: u32, segments: &[(u32, u32, &[u8], u32)]) -> Vec<u8> {
        let phoff = EH_SIZE;
        let data_start = phoff + segments.len() * PH_SIZE;
        let mut out = vec![0u8; data_start];
        out[0..4].copy_from_slice(b"\x7FELF");
        out[4] = ELFCLASS32;
        out[5] = ELFDATA2LSB;
        out[6] = 1;
        out[16..18].copy_from_slice(&2u16.to_le_bytes());
        out[18..20].copy_from_slice(&EM_386.to_le_bytes());
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[24..28].copy_from_slice(&entry.to_le_bytes());
        out[28..32].copy_from_slice(&(phoff as u32).to_le_bytes());
        out[40..42].copy_from_slice(&(EH_SIZE as u16).to_le_bytes());
        out[42..44].copy_from_slice(&(PH_SIZE as u16).to_le_bytes());
        out[44..46].copy_from_slice(&(segments.len() as u16).to_le_bytes());

        for (i, (vaddr, flags, payload, memsz)) in segments.iter().enumerate() {
            let offset = out.len() as u32;
            out.extend_from_slice(payload);
            let ph = phoff + i * PH_SIZE;
            let fields = [PT_LOAD, offset, *vaddr, *vaddr, payload.len() as u32, *memsz, *flags, 0x1000];
            for (j, v) in fields.iter().enumerate() {
                out[ph + j * 4..ph + j * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn parses_entry_and_segments() {
        let img = build(0x0400_0010, &[(0x0400_0000, 5, b"code", 4), (0x0400_1000, 6, b"data", 0x20)]);
        let view = elf32_view(&img).unwrap();
        assert_eq!(view.entry(), VirtualAddress::new(0x0400_0010));

        let segs: Vec<_> = view.iter_pt_load().collect();
        assert_eq!(segs.len(), 2);
        assert!(segs[0].p_flags.execute() && !segs[0].p_flags.write());
        assert!(segs[1].p_flags.write());
        assert_eq!(segs[1].p_memsz, 0x20);
        assert_eq!(view.segment_bytes(&segs[1]).unwrap(), b"data");
    }

    #[test]
    fn rejects_foreign_images() {
        assert_eq!(elf32_view(b"hello").err(), Some(ElfError::TooShort));

        let good = build(0x0400_0000, &[(0x0400_0000, 5, b"x", 1)]);
        let mut bad = good.clone();
        bad[0] = 0;
        assert_eq!(elf32_view(&bad).err(), Some(ElfError::BadMagic));

        let mut bad = good.clone();
        bad[4] = 2;
        assert_eq!(elf32_view(&bad).err(), Some(ElfError::BadClass));

        let mut bad = good.clone();
        bad[18] = 62;
        assert_eq!(elf32_view(&bad).err(), Some(ElfError::BadMachine));

        let mut bad = good.clone();
        bad[44] = 0;
        assert_eq!(elf32_view(&bad).err(), Some(ElfError::NoProgramHeaders));

        let mut bad = good;
        bad[44] = 200;
        assert_eq!(elf32_view(&bad).err(), Some(ElfError::Oob));
    }

    #[test]
    fn segment_range_is_bounds_checked() {
        let img = build(0x0400_0000, &[(0x0400_0000, 5, b"x", 1)]);
        let view = elf32_view(&img).unwrap();
        let mut ph = view.iter_pt_load().next().unwrap();
        ph.p_filesz = 0x1000;
        assert_eq!(view.segment_bytes(&ph), Err(ElfError::Oob));
        ph.p_offset = u32::MAX;
        assert_eq!(view.segment_bytes(&ph), Err(ElfError::Oob));
    }
}
