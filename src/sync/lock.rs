//! Blocking lock: two interchangeable implementations selectable at
//! build time via the `lock_with_semaphores` feature. Both satisfy the
//! same contract: non-recursive acquire/release, `do_i_hold`, panic on
//! destroying a held lock or releasing from a non-owner.

use crate::spinlock::SpinLock;
use crate::spl::InterruptControl;
use crate::wchan::{Scheduler, ThreadId, WaitChannel};

#[cfg(feature = "lock_with_semaphores")]
pub use sem_variant::Lock;
#[cfg(not(feature = "lock_with_semaphores"))]
pub use wchan_variant::Lock;

/// Inner spinlock + wait channel variant.
mod wchan_variant {
    use super::*;

    struct LockState {
        owner: Option<ThreadId>,
        wc: WaitChannel,
    }

    pub struct Lock<'ic, 'sch> {
        name: &'static str,
        state: SpinLock<'ic, LockState>,
        sched: &'sch dyn Scheduler,
    }

    impl<'ic, 'sch> Lock<'ic, 'sch> {
        pub fn new(name: &'static str, ic: &'ic dyn InterruptControl, sched: &'sch dyn Scheduler) -> Self {
            Lock {
                name,
                state: SpinLock::new(name, ic, LockState {
                    owner: None,
                    wc: WaitChannel::new(name),
                }),
                sched,
            }
        }

        pub fn name(&self) -> &'static str {
            self.name
        }

        pub fn acquire(&self) {
            let me = self.sched.current();
            let mut g = self.state.lock();
            assert!(g.owner != Some(me), "lock {}: reacquired by owner", self.name);
            while g.owner.is_some() {
                g = WaitChannel::sleep(g, |s| &mut s.wc, self.sched);
            }
            g.owner = Some(me);
        }

        pub fn release(&self) {
            let me = self.sched.current();
            let mut g = self.state.lock();
            if g.owner != Some(me) {
                log::error!("lock {}: released by non-owner", self.name);
                panic!("lock {}: released by non-owner", self.name);
            }
            g.owner = None;
            g.wc.wake_one(self.sched);
        }

        pub fn do_i_hold(&self) -> bool {
            self.state.lock().owner == Some(self.sched.current())
        }
    }

    impl Drop for Lock<'_, '_> {
        fn drop(&mut self) {
            if self.state.lock().owner.is_some() {
                log::error!("lock {}: destroyed while held", self.name);
                panic!("lock {}: destroyed while held", self.name);
            }
        }
    }
}

/// Inner binary semaphore guards the critical section; a separate
/// spinlock protects owner metadata.
mod sem_variant {
    use super::*;
    use crate::sync::semaphore::Semaphore;

    pub struct Lock<'ic, 'sch> {
        name: &'static str,
        sem: Semaphore<'ic, 'sch>,
        owner: SpinLock<'ic, Option<ThreadId>>,
        sched: &'sch dyn Scheduler,
    }

    impl<'ic, 'sch> Lock<'ic, 'sch> {
        pub fn new(name: &'static str, ic: &'ic dyn InterruptControl, sched: &'sch dyn Scheduler) -> Self {
            Lock {
                name,
                sem: Semaphore::new(name, 1, ic, sched),
                owner: SpinLock::new(name, ic, None),
                sched,
            }
        }

        pub fn name(&self) -> &'static str {
            self.name
        }

        pub fn acquire(&self) {
            assert!(!self.do_i_hold(), "lock {}: reacquired by owner", self.name);
            self.sem.p();
            *self.owner.lock() = Some(self.sched.current());
        }

        pub fn release(&self) {
            let me = self.sched.current();
            let mut g = self.owner.lock();
            if *g != Some(me) {
                log::error!("lock {}: released by non-owner", self.name);
                panic!("lock {}: released by non-owner", self.name);
            }
            *g = None;
            drop(g);
            self.sem.v();
        }

        pub fn do_i_hold(&self) -> bool {
            *self.owner.lock() == Some(self.sched.current())
        }
    }

    impl Drop for Lock<'_, '_> {
        fn drop(&mut self) {
            if self.owner.lock().is_some() {
                log::error!("lock {}: destroyed while held", self.name);
                panic!("lock {}: destroyed while held", self.name);
            }
        }
    }
}
