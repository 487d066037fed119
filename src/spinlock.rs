//! Non-blocking mutual exclusion for code shared across CPUs.
//!
//! Test-and-set with a per-CPU nesting counter for `push_off`/`pop_off`,
//! wrapped in a safe `SpinLock<T>` + guard shape: the lock owns its data,
//! and the only way to touch the data is through a guard that releases
//! on drop.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::param::NCPU;
use crate::spl::{cpuid, InterruptControl};

/// Per-CPU bookkeeping `push_off`/`pop_off` needs: how many spinlocks this
/// CPU currently holds, and whether interrupts were enabled before the
/// first of them was taken.
pub struct Cpu {
    noff: AtomicUsize,
    intena: AtomicBool,
}

impl Cpu {
    const fn new() -> Self {
        Cpu {
            noff: AtomicUsize::new(0),
            intena: AtomicBool::new(false),
        }
    }
}

static CPUS: [Cpu; NCPU] = [const { Cpu::new() }; NCPU];

fn mycpu() -> &'static Cpu {
    &CPUS[cpuid()]
}

/// Disable interrupts on this CPU; nestable. The first call in a nest
/// remembers whether interrupts were on so the matching `pop_off` can put
/// them back exactly as found.
pub fn push_off(ic: &dyn InterruptControl) {
    let was_enabled = ic.are_enabled();
    ic.disable();
    let cpu = mycpu();
    if cpu.noff.load(Ordering::Relaxed) == 0 {
        cpu.intena.store(was_enabled, Ordering::Relaxed);
    }
    cpu.noff.fetch_add(1, Ordering::Relaxed);
}

/// Undo one `push_off`. Only once the nesting count reaches zero are
/// interrupts restored to their pre-nest state.
pub fn pop_off(ic: &dyn InterruptControl) {
    let cpu = mycpu();
    let prev = cpu.noff.load(Ordering::Relaxed);
    if prev == 0 {
        panic!("pop_off: not holding any spinlocks");
    }
    let remaining = cpu.noff.fetch_sub(1, Ordering::Relaxed) - 1;
    if remaining == 0 && cpu.intena.load(Ordering::Relaxed) {
        ic.enable();
    }
}

/// Non-blocking mutual exclusion, safe to use from any CPU. Acquiring
/// disables preemption on the acquiring CPU via `push_off`; sleeping while
/// holding one is forbidden and asserted against by [`crate::wchan`].
pub struct SpinLock<'ic, T: ?Sized> {
    name: &'static str,
    locked: AtomicBool,
    ic: &'ic dyn InterruptControl,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SpinLock<'_, T> {}

pub struct SpinLockGuard<'a, 'ic, T: ?Sized> {
    lock: &'a SpinLock<'ic, T>,
}

impl<'ic, T> SpinLock<'ic, T> {
    pub const fn new(name: &'static str, ic: &'ic dyn InterruptControl, data: T) -> Self {
        SpinLock {
            name,
            locked: AtomicBool::new(false),
            ic,
            data: UnsafeCell::new(data),
        }
    }
}

impl<'ic, T: ?Sized> SpinLock<'ic, T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spin until the lock is acquired. Panics if this CPU already holds
    /// it (non-recursive).
    pub fn lock(&self) -> SpinLockGuard<'_, 'ic, T> {
        push_off(self.ic);
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinLockGuard { lock: self }
    }

    /// True if the lock is currently held by *some* CPU. Racy by nature;
    /// useful only for assertions ("must not hold a spinlock here").
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
        pop_off(self.ic);
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, '_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, '_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, '_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl<'a, 'ic, T: ?Sized> SpinLockGuard<'a, 'ic, T> {
    /// The lock this guard was borrowed from, for callers (wait channels,
    /// condition variables) that must release-then-reacquire the exact
    /// same lock around a blocking sleep.
    pub fn source_lock(&self) -> &'a SpinLock<'ic, T> {
        self.lock
    }
}

/// True if the current CPU holds no spinlocks at all. Backs `can_sleep`
/// assertions in the allocator and wait channel.
pub fn holds_no_spinlocks() -> bool {
    mycpu().noff.load(Ordering::Relaxed) == 0
}
