//! # QEMU Debug Console Support
//!
//! Log and trace output for the kernel when it runs under QEMU, written byte
//! by byte to the debug console port `0x402` (`-debugcon stdio`).
//!
//! ## Components
//!
//! - [`QemuLogger`]: a `log::Log` implementation producing
//!   `"[LEVEL] target: message"` lines without allocating.
//! - [`qemu_trace!`]: `format!`-style output that bypasses `log`, usable
//!   before the logger is installed.
//! - [`qemu_fmt::write_bytes`]: raw byte output, used as the console sink
//!   for the `write` system call.
//!
//! ## Features
//!
//! With the `enabled` feature off, or when not building for i386, every
//! output function is a no-op. The port write is the only privileged
//! instruction in this crate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! if QemuLogger::new(LevelFilter::Debug).init().is_ok() {
//!     info!("logger up");
//! }
//! ```
//!
//! ```bash
//! qemu-system-i386 -kernel kernel.elf -debugcon stdio
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number for QEMU's debug port.
    pub const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(all(feature = "enabled", target_arch = "x86"))]
        unsafe {
            outb(QEMU_DEBUG_PORT, c);
        }
        #[cfg(not(all(feature = "enabled", target_arch = "x86")))]
        let _ = c;
    }

    #[cfg(all(feature = "enabled", target_arch = "x86"))]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn outb(port: u16, val: u8) {
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, nostack, preserves_flags)
            );
        }
    }

    /// Send raw bytes, unchanged.
    #[inline]
    pub fn write_bytes(bytes: &[u8]) {
        for &b in bytes {
            dbg_putc(b);
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            write_bytes(s.as_bytes());
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort debug output.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
