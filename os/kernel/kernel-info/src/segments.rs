//! # Segment Selectors
//!
//! Flat-model GDT layout. User selectors carry RPL 3.

/// Ring-0 code segment.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Ring-0 data/stack segment.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

/// Ring-3 code segment (`0x18 | RPL 3`).
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;

/// Ring-3 data/stack segment (`0x20 | RPL 3`).
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;

/// Task state segment.
pub const TSS_SELECTOR: u16 = 0x28;

/// `EFLAGS` for a freshly started user process: reserved bit 1 and `IF`.
pub const USER_INITIAL_EFLAGS: u32 = 0x202;

/// `EFLAGS.IF`, interrupts enabled.
pub const EFLAGS_INTERRUPT_ENABLE: u32 = 1 << 9;

/// Software interrupt vector used for system calls (`int 0x80`).
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Requested privilege level encoded in a selector.
#[must_use]
pub const fn rpl(selector: u16) -> u8 {
    (selector & 0b11) as u8
}

const _: () = {
    assert!(rpl(USER_CODE_SELECTOR) == 3 && rpl(USER_DATA_SELECTOR) == 3);
    assert!(rpl(KERNEL_CODE_SELECTOR) == 0 && rpl(KERNEL_DATA_SELECTOR) == 0);
    assert!(USER_INITIAL_EFLAGS & EFLAGS_INTERRUPT_ENABLE != 0);
};
