//! Educational kernel core: physical frame allocator + software-refilled
//! TLB, and the synchronization primitives (spinlock, wait channel,
//! semaphore, lock, condition variable) that the process lifecycle and
//! syscall surface are built on.
//!
//! `no_std` on a real boot; compiled against full `std` under `#[cfg(test)]`
//! so the blocking primitives can be exercised with genuine OS-thread
//! concurrency (see [`sched::std_sched`]) instead of a simulated scheduler.

#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod error;
pub mod fs;
pub mod param;
pub mod pfa;
pub mod proc;
pub mod sched;
pub mod spinlock;
pub mod spl;
pub mod sync;
pub mod syscall;
pub mod vm;
pub mod wchan;

mod logging;
pub use logging::ConsoleLogger;

use console::ConsoleBackend;
use fs::{OpenFileTable, VfsBackend};
use pfa::PhysFrameAllocator;
use proc::ProcTable;
use spl::InterruptControl;
use wchan::Scheduler;

/// Groups the state an educational kernel would otherwise keep as
/// free-standing statics (the physical frame bitmap, the system
/// open-file table, the process table, the current-CPU interrupt
/// controller and scheduler) into one value. A real boot constructs
/// exactly one of these; tests construct as many independent ones as
/// they need.
pub struct Kernel<'a> {
    pub proc_table: ProcTable<'a, 'a>,
    pub pfa: PhysFrameAllocator<'a, 'a>,
    pub openfiles: OpenFileTable<'a>,
    pub vfs: &'a dyn VfsBackend,
    pub console: &'a dyn ConsoleBackend,
    pub ic: &'a dyn InterruptControl,
    pub sched: &'a dyn Scheduler,
}
