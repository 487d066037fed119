//! Condition variable with Mesa semantics.
//!
//! `wait` requires the caller already holds the companion [`Lock`]; it
//! must drop that lock before blocking and reacquire it only after the
//! inner spinlock has been released, or a signaler blocked on the same
//! lock could never make progress. `WaitChannel::sleep`'s guard-by-value
//! signature enforces this ordering: there is no way to call it while
//! still holding `lk`.

use crate::spinlock::SpinLock;
use crate::spl::InterruptControl;
use crate::sync::lock::Lock;
use crate::wchan::{Scheduler, WaitChannel};

/// Name, wait channel, and spinlock for one condition variable. The
/// companion [`Lock`] is *not* stored here: callers pass it to every
/// call, exactly as `pthread_cond_wait` takes a mutex argument rather
/// than binding to one at construction.
pub struct CondVar<'ic, 'sch> {
    name: &'static str,
    wc: SpinLock<'ic, WaitChannel>,
    sched: &'sch dyn Scheduler,
}

impl<'ic, 'sch> CondVar<'ic, 'sch> {
    pub fn new(name: &'static str, ic: &'ic dyn InterruptControl, sched: &'sch dyn Scheduler) -> Self {
        CondVar {
            name,
            wc: SpinLock::new(name, ic, WaitChannel::new(name)),
            sched,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Caller must hold `lk`. Releases it, sleeps, and reacquires it
    /// before returning. No guarantee the predicate still holds on
    /// return: callers MUST re-test in a loop.
    pub fn wait(&self, lk: &Lock<'ic, 'sch>) {
        assert!(lk.do_i_hold(), "cv {}: wait without holding the lock", self.name);
        let g = self.wc.lock();
        lk.release();
        drop(WaitChannel::sleep(g, |wc| wc, self.sched));
        lk.acquire();
    }

    /// Caller must hold `lk`. Wakes one waiter, if any.
    pub fn signal(&self, lk: &Lock<'ic, 'sch>) {
        assert!(lk.do_i_hold(), "cv {}: signal without holding the lock", self.name);
        self.wc.lock().wake_one(self.sched);
    }

    /// Caller must hold `lk`. Wakes every waiter.
    pub fn broadcast(&self, lk: &Lock<'ic, 'sch>) {
        assert!(lk.do_i_hold(), "cv {}: broadcast without holding the lock", self.name);
        self.wc.lock().wake_all(self.sched);
    }
}
