//! Counting semaphore.

use crate::spinlock::SpinLock;
use crate::spl::InterruptControl;
use crate::wchan::{Scheduler, WaitChannel};

struct SemState {
    count: u32,
    wc: WaitChannel,
}

/// Name, nonnegative count, wait channel, and spinlock for one counting
/// semaphore. `p` blocks while `count == 0`; `v` never blocks.
pub struct Semaphore<'ic, 'sch> {
    name: &'static str,
    state: SpinLock<'ic, SemState>,
    sched: &'sch dyn Scheduler,
}

impl<'ic, 'sch> Semaphore<'ic, 'sch> {
    pub fn new(name: &'static str, initial: u32, ic: &'ic dyn InterruptControl, sched: &'sch dyn Scheduler) -> Self {
        Semaphore {
            name,
            state: SpinLock::new(name, ic, SemState {
                count: initial,
                wc: WaitChannel::new(name),
            }),
            sched,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block the calling thread until `count > 0`, then decrement it.
    /// Must not be called from an interrupt handler.
    pub fn p(&self) {
        let mut g = self.state.lock();
        while g.count == 0 {
            g = WaitChannel::sleep(g, |s| &mut s.wc, self.sched);
        }
        g.count -= 1;
    }

    /// Increment the count and wake one waiter, if any. Never blocks.
    pub fn v(&self) {
        let mut g = self.state.lock();
        g.count += 1;
        g.wc.wake_one(self.sched);
    }

    #[cfg(test)]
    fn count(&self) -> u32 {
        self.state.lock().count
    }
}
