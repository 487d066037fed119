//! Interrupt-priority primitive.
//!
//! `spl_high`/`spl_restore` bracket the only code in this crate that is
//! allowed to frob hardware state behind the compiler's back: TLB
//! installation in [`crate::vm`]. The actual CSR manipulation is
//! arch-specific and belongs to the excluded trap-entry layer, so it is
//! exposed here as the `InterruptControl` capability, the same way
//! `VfsBackend` stands in for the excluded VFS.
//!
//! Hart identification (`cpuid`) is the other piece of arch glue `spl` and
//! [`crate::spinlock`] both need; on real hardware it is a single CSR read
//! of a per-hart register. Off hardware (host tests) each `std::thread` is
//! treated as its own hart, assigned an id lazily on first use.

use crate::param::NCPU;

/// Arch-specific interrupt masking, supplied by the trap-entry layer.
///
/// Expressed as a capability so this crate never has to assume a
/// particular ISA's enable/disable-interrupts instructions.
pub trait InterruptControl: Sync {
    fn are_enabled(&self) -> bool;
    fn disable(&self);
    fn enable(&self);
}

/// Raise IPL to "high" (mask interrupts), returning the prior enabled state
/// so the caller can restore it precisely.
pub fn spl_high(ic: &dyn InterruptControl) -> bool {
    let was_enabled = ic.are_enabled();
    ic.disable();
    was_enabled
}

/// Restore the interrupt state captured by a prior [`spl_high`].
pub fn spl_restore(ic: &dyn InterruptControl, was_enabled: bool) {
    if was_enabled {
        ic.enable();
    }
}

#[cfg(not(test))]
extern "Rust" {
    /// Reads this hart's id out of whatever arch register holds it
    /// (`tp` on RISC-V). Provided by the boot/arch layer.
    fn arch_hart_id() -> usize;
}

/// This CPU's index into per-CPU tables (0..NCPU).
#[cfg(not(test))]
pub fn cpuid() -> usize {
    unsafe { arch_hart_id() % NCPU }
}

#[cfg(test)]
pub fn cpuid() -> usize {
    use core::cell::Cell;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::thread_local;

    static NEXT: AtomicUsize = AtomicUsize::new(0);
    thread_local! {
        static ID: Cell<Option<usize>> = Cell::new(None);
    }

    ID.with(|id| {
        if let Some(v) = id.get() {
            return v;
        }
        let v = NEXT.fetch_add(1, Ordering::Relaxed) % NCPU;
        id.set(Some(v));
        v
    })
}

/// An `InterruptControl` that does not actually mask anything.
///
/// Not wired up by anything in this crate on a real boot (the arch layer
/// always supplies a real one); it exists for tests and for early boot
/// code that runs before interrupts are a concern.
pub struct NullInterruptControl;

impl InterruptControl for NullInterruptControl {
    fn are_enabled(&self) -> bool {
        true
    }
    fn disable(&self) {}
    fn enable(&self) {}
}
