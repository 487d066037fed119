//! Boot entry point.
//!
//! Everything this binary needs to actually reach user mode — the trap
//! vector, the arch-specific TLB/CSR glue, the VFS, the console UART
//! driver — lives in the excluded layers and is not part of this
//! crate. `main` exists to show how the pieces here wire together: a
//! real boot would supply concrete [`nanokernel::console::ConsoleBackend`],
//! [`nanokernel::fs::VfsBackend`], [`nanokernel::pfa::RamSource`],
//! [`nanokernel::spl::InterruptControl`], and
//! [`nanokernel::wchan::Scheduler`] implementations in place of the
//! panicking stubs below.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

#[cfg(not(test))]
use core::panic::PanicInfo;

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {}
}

#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    loop {}
}

#[cfg(test)]
fn main() {}
