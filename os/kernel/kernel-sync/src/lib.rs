//! # Kernel synchronization primitives
//!
//! The kernel runs on one core and never preempts itself, so contention only
//! arises between the trap path and interrupt handlers. The primitives here
//! are the single place a multi-core port would need to strengthen:
//!
//! - [`SpinLock`]: a test-and-test-and-set lock with an RAII guard.
//! - [`IrqGuard`]: masks hardware interrupts for a scope (i386 `IF` flag).
//! - [`SpinLock::lock_irq`]: both at once, for state that an interrupt
//!   handler may also touch.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::IrqGuard;
pub use spin_lock::{IrqSpinLockGuard, SpinLock, SpinLockGuard};
