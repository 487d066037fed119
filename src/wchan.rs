//! Wait channel.
//!
//! A named thread-parking queue. `WaitChannel::sleep` requires the caller
//! to already hold a [`SpinLock`] guard; it enqueues the current thread
//! while still holding the lock, drops the guard (releasing it), then
//! parks — giving an atomic release-and-sleep without needing a combined
//! lock+wchan primitive.
//!
//! The actual block/unblock mechanics are delegated to a [`Scheduler`]
//! capability (an external collaborator, like `VfsBackend`): this crate
//! never touches a run queue or performs a context switch, both of which
//! belong to the excluded trap/scheduler layer. Because `park`/`unpark`
//! remember a pending wakeup token (exactly like `std::thread::park`), an
//! `unpark` that races ahead of the matching `park` is not lost, which is
//! what makes a bare sleep/wakeup queue without this token prone to
//! missed wakeups.

use crate::param::MAX_WAITERS;
use crate::spinlock::SpinLockGuard;

/// Opaque thread identity, stable for the thread's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u32);

/// The scheduler capability wait channels block/wake threads through.
///
/// Implemented by the excluded scheduler/context-switch layer in a real
/// boot; implemented by `std::thread::park`/`unpark` in this crate's own
/// tests (see `sched::std_sched`, `#[cfg(test)]`-only).
pub trait Scheduler: Sync {
    /// Identity of the thread calling this method.
    fn current(&self) -> ThreadId;
    /// Block the calling thread until a matching `unpark`. If `unpark` was
    /// already called for this id since the last `park`, returns
    /// immediately (token semantics, not a counting semaphore).
    fn park(&self, me: ThreadId);
    /// Wake `who` if parked, or arm a pending token for its next `park`.
    fn unpark(&self, who: ThreadId);
}

/// A named queue of threads parked on some condition.
pub struct WaitChannel {
    name: &'static str,
    waiters: [Option<ThreadId>; MAX_WAITERS],
    len: usize,
}

impl WaitChannel {
    pub const fn new(name: &'static str) -> Self {
        WaitChannel {
            name,
            waiters: [None; MAX_WAITERS],
            len: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn enqueue(&mut self, id: ThreadId) {
        assert!(self.len < MAX_WAITERS, "wchan {}: waiter list full", self.name);
        self.waiters[self.len] = Some(id);
        self.len += 1;
    }

    fn dequeue_one(&mut self) -> Option<ThreadId> {
        if self.len == 0 {
            return None;
        }
        let id = self.waiters[0].take();
        // FIFO, not priority-ordered: shift the rest down.
        for i in 1..self.len {
            self.waiters[i - 1] = self.waiters[i].take();
        }
        self.len -= 1;
        id
    }

    /// Atomically enqueue the current thread, release `guard`'s lock, and
    /// block. Reacquires the same lock before returning.
    ///
    /// `project` picks the `WaitChannel` out of the locked data (it is
    /// usually a sibling field, as in [`crate::sync::condvar::CondVar`]).
    /// Taking it as a closure rather than `&mut WaitChannel` directly is
    /// what lets the caller hand `guard` over by value in the same call:
    /// the projection runs and finishes borrowing `guard` before it moves.
    pub fn sleep<'a, 'ic, T: ?Sized>(
        mut guard: SpinLockGuard<'a, 'ic, T>,
        project: impl FnOnce(&mut T) -> &mut WaitChannel,
        sched: &dyn Scheduler,
    ) -> SpinLockGuard<'a, 'ic, T> {
        let me = sched.current();
        project(&mut guard).enqueue(me);
        let lock = guard.source_lock();
        drop(guard);
        sched.park(me);
        lock.lock()
    }

    /// Wake one waiter, if any. Caller must hold the associated spinlock.
    pub fn wake_one(&mut self, sched: &dyn Scheduler) {
        if let Some(id) = self.dequeue_one() {
            sched.unpark(id);
        }
    }

    /// Wake every waiter. Caller must hold the associated spinlock.
    pub fn wake_all(&mut self, sched: &dyn Scheduler) {
        while let Some(id) = self.dequeue_one() {
            sched.unpark(id);
        }
    }
}
