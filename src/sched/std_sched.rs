//! Host-only [`Scheduler`] backed by real OS threads, for exercising the
//! blocking primitives (semaphore, lock, condvar, wait channel) under
//! genuine concurrency without a real scheduler or context switch.
//!
//! Each participating `std::thread` registers itself (lazily, on first
//! `current()`) and is addressed by the [`ThreadId`] the wait-channel
//! layer hands back. `park`/`unpark` delegate straight to
//! `std::thread::park`/`Thread::unpark`, which already have exactly the
//! token semantics [`crate::wchan::WaitChannel::sleep`] relies on: an
//! `unpark` that arrives before the matching `park` is not lost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread::{self, Thread};

use crate::wchan::{Scheduler, ThreadId};

thread_local! {
    static MY_ID: std::cell::Cell<Option<u32>> = std::cell::Cell::new(None);
}

#[derive(Default)]
pub struct StdScheduler {
    next_id: AtomicU32,
    directory: Mutex<HashMap<u32, Thread>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        StdScheduler {
            next_id: AtomicU32::new(1),
            directory: Mutex::new(HashMap::new()),
        }
    }
}

impl Scheduler for StdScheduler {
    fn current(&self) -> ThreadId {
        let id = MY_ID.with(|cell| {
            if let Some(id) = cell.get() {
                return id;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.directory
                .lock()
                .unwrap()
                .insert(id, thread::current());
            cell.set(Some(id));
            id
        });
        ThreadId(id)
    }

    fn park(&self, _me: ThreadId) {
        // `me` is always the calling thread by construction (wait channels
        // only ever park `sched.current()`), so parking this OS thread is
        // always correct regardless of the id passed in.
        thread::park();
    }

    fn unpark(&self, who: ThreadId) {
        if let Some(t) = self.directory.lock().unwrap().get(&who.0) {
            t.unpark();
        }
    }
}
