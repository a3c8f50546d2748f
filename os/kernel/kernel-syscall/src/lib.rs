//! # System Call ABI
//!
//! The contract between user programs and the kernel's `int 0x80` gate.
//!
//! | Register | On entry       | On return |
//! |----------|----------------|-----------|
//! | `eax`    | call number    | result    |
//! | `ebx`    | argument 1     |           |
//! | `ecx`    | argument 2     |           |
//! | `edx`    | argument 3     |           |
//!
//! Results are 32-bit; values that read as negative `i32` are `-errno`.
//! Call numbers follow the i386 Linux table for the calls that exist.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(target_arch = "x86")]
pub mod user;

/// Interrupt vector of the system call gate.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// System call numbers.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sysno {
    /// `exit(code)`; never returns to the caller.
    Exit = 1,
    /// `fork()`; `0` in the child, the child's pid in the parent.
    Fork = 2,
    /// `write(fd, buf, len)`; only fd 1 exists.
    Write = 4,
    /// `waitpid(pid)`; `-1` waits for any child.
    Waitpid = 7,
    /// `execve(path, argv)`; `argv` is ignored.
    Execve = 11,
    Getpid = 20,
    /// Reserved; always `ENOSYS`.
    Brk = 45,
}

impl Sysno {
    pub const ALL: [Self; 7] = [
        Self::Exit,
        Self::Fork,
        Self::Write,
        Self::Waitpid,
        Self::Execve,
        Self::Getpid,
        Self::Brk,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::Fork => "fork",
            Self::Write => "write",
            Self::Waitpid => "waitpid",
            Self::Execve => "execve",
            Self::Getpid => "getpid",
            Self::Brk => "brk",
        }
    }
}

impl TryFrom<u32> for Sysno {
    type Error = Errno;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| *s as u32 == value)
            .ok_or(Errno::ENOSYS)
    }
}

/// Error codes returned (negated) in `eax`.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Errno {
    #[error("operation not permitted")]
    EPERM = 1,
    #[error("no such file or directory")]
    ENOENT = 2,
    #[error("exec format error")]
    ENOEXEC = 8,
    #[error("bad file descriptor")]
    EBADF = 9,
    #[error("no child processes")]
    ECHILD = 10,
    #[error("out of memory")]
    ENOMEM = 12,
    #[error("bad address")]
    EFAULT = 14,
    /// `waitpid` found live children but no zombie: try again once woken.
    #[error("resource busy")]
    EBUSY = 16,
    #[error("invalid argument")]
    EINVAL = 22,
    #[error("function not implemented")]
    ENOSYS = 38,
}

impl Errno {
    const ALL: [Self; 10] = [
        Self::EPERM,
        Self::ENOENT,
        Self::ENOEXEC,
        Self::EBADF,
        Self::ECHILD,
        Self::ENOMEM,
        Self::EFAULT,
        Self::EBUSY,
        Self::EINVAL,
        Self::ENOSYS,
    ];

    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// The register value for this error: `-code` as two's complement.
    #[must_use]
    pub const fn as_return(self) -> u32 {
        self.code().wrapping_neg()
    }

    /// The error encoded in a result register, if it is one we know.
    #[must_use]
    pub fn from_return(value: u32) -> Option<Self> {
        let code = value.wrapping_neg();
        Self::ALL.into_iter().find(|e| e.code() == code)
    }
}

/// Encode a handler result for `eax`.
#[inline]
#[must_use]
pub const fn encode(result: Result<u32, Errno>) -> u32 {
    match result {
        Ok(value) => value,
        Err(e) => e.as_return(),
    }
}

/// Decode an `eax` result. Values that do not name a known error are
/// treated as successful results.
#[inline]
#[must_use]
pub fn decode(value: u32) -> Result<u32, Errno> {
    #[allow(clippy::cast_possible_wrap)]
    if (value as i32) < 0 {
        if let Some(e) = Errno::from_return(value) {
            return Err(e);
        }
    }
    Ok(value)
}

/// The four ABI registers of one call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SyscallArgs {
    pub number: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
}

impl SyscallArgs {
    #[must_use]
    pub const fn new(number: u32, arg1: u32, arg2: u32, arg3: u32) -> Self {
        Self {
            number,
            arg1,
            arg2,
            arg3,
        }
    }

    /// `arg1` reinterpreted as a signed value (pid filters).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn arg1_signed(&self) -> i32 {
        self.arg1 as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_match_i386_table() {
        assert_eq!(Sysno::try_from(4), Ok(Sysno::Write));
        assert_eq!(Sysno::try_from(11), Ok(Sysno::Execve));
        assert_eq!(Sysno::try_from(3), Err(Errno::ENOSYS));
        assert_eq!(Sysno::try_from(u32::MAX), Err(Errno::ENOSYS));
    }

    #[test]
    fn errors_are_negative_in_eax() {
        assert_eq!(Errno::ENOSYS.as_return() as i32, -38);
        assert_eq!(encode(Err(Errno::ECHILD)) as i32, -10);
        assert_eq!(encode(Ok(5)), 5);
        assert_eq!(decode(Errno::EBUSY.as_return()), Err(Errno::EBUSY));
        assert_eq!(decode(7), Ok(7));
        assert_eq!(decode(u32::MAX - 1000), Ok(u32::MAX - 1000));
    }
}
