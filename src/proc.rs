//! Process lifecycle: fork, exit, waitpid, getpid, built on the
//! synchronization layer in [`crate::sync`].
//!
//! The trapframe copy, the child-thread spawn trampoline, and actually
//! copying a parent's memory contents into a child's freshly allocated
//! frames all belong to the excluded trap/loader layer; this module's
//! `fork` duplicates the process record and the address-space
//! *description*, allocating fresh physical backing for it, and stops
//! there. Syscalls identify "which process is calling" by an explicit
//! `caller_pid` parameter rather than a thread-local lookup, since that
//! lookup is itself trap-layer machinery out of scope here.

use crate::error::{KernelError, KResult};
use crate::param::{NPROC, OPEN_MAX};
use crate::pfa::PhysFrameAllocator;
use crate::spinlock::SpinLock;
use crate::spl::InterruptControl;
use crate::sync::{CondVar, Lock};
use crate::vm::AddressSpace;
use crate::wchan::Scheduler;

pub const MAX_NAME: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Zombie,
    Reaped,
}

struct ExitRendezvous<'ic, 'sch> {
    exit_code: i32,
    has_exited: bool,
    lock: Lock<'ic, 'sch>,
    cv: CondVar<'ic, 'sch>,
}

/// PID, name, address space, parent PID, openfiles, and exit rendezvous
/// for one process. `openfiles` holds indices into the system-wide
/// open-file table ([`crate::fs::OpenFileTable`]), not the `OpenFile`
/// records themselves.
pub struct Process<'ic, 'sch> {
    pub pid: u32,
    pub parent_pid: u32,
    name: [u8; MAX_NAME],
    name_len: usize,
    pub address_space: AddressSpace,
    pub openfiles: [Option<usize>; OPEN_MAX],
    state: ProcState,
    waited: bool,
    exit: ExitRendezvous<'ic, 'sch>,
}

impl<'ic, 'sch> Process<'ic, 'sch> {
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }
}

fn copy_name(src: &str, buf: &mut [u8; MAX_NAME]) -> usize {
    let bytes = src.as_bytes();
    let n = bytes.len().min(MAX_NAME);
    buf[..n].copy_from_slice(&bytes[..n]);
    n
}

/// Fixed-size process table: PID 0 is never assigned, so `pid - 1`
/// indexes directly into a `[Option<Process>; NPROC]`-shaped array
/// without a separate PID→slot map.
pub struct ProcTable<'ic, 'sch> {
    slots: SpinLock<'ic, [Option<Process<'ic, 'sch>>; NPROC]>,
    ic: &'ic dyn InterruptControl,
    sched: &'sch dyn Scheduler,
}

impl<'ic, 'sch> ProcTable<'ic, 'sch> {
    pub fn new(ic: &'ic dyn InterruptControl, sched: &'sch dyn Scheduler) -> Self {
        ProcTable {
            slots: SpinLock::new("proctable", ic, core::array::from_fn(|_| None)),
            ic,
            sched,
        }
    }

    fn new_process(&self, pid: u32, parent_pid: u32, name: &str, address_space: AddressSpace) -> Process<'ic, 'sch> {
        let mut name_buf = [0u8; MAX_NAME];
        let name_len = copy_name(name, &mut name_buf);
        Process {
            pid,
            parent_pid,
            name: name_buf,
            name_len,
            address_space,
            openfiles: [None; OPEN_MAX],
            state: ProcState::Running,
            waited: false,
            exit: ExitRendezvous {
                exit_code: 0,
                has_exited: false,
                lock: Lock::new("p_exit_cv_lock", self.ic, self.sched),
                cv: CondVar::new("p_exit_cv", self.ic, self.sched),
            },
        }
    }

    /// Install the boot/initial process into slot 0 (PID 1), with no
    /// parent. Used once at startup; `fork` is the only other way a
    /// process enters the table.
    pub fn spawn_init(&self, name: &str, address_space: AddressSpace) -> KResult<u32> {
        let mut g = self.slots.lock();
        if g[0].is_some() {
            return Err(KernelError::InvalidArg);
        }
        g[0] = Some(self.new_process(1, 0, name, address_space));
        Ok(1)
    }

    fn find_free_slot(g: &[Option<Process<'ic, 'sch>>; NPROC]) -> Option<usize> {
        g.iter().position(|s| s.is_none())
    }

    /// Duplicate `parent_pid`'s process record and address space into a
    /// freshly allocated slot. The trapframe copy and child-thread spawn
    /// that would actually resume the child are the excluded
    /// trap/loader layer's job. Returns the child's PID.
    ///
    /// On allocation failure, no frames are left allocated and no slot is
    /// consumed: `NoMem` is returned cleanly.
    pub fn fork(&self, parent_pid: u32, pfa: &PhysFrameAllocator) -> KResult<u32> {
        let mut g = self.slots.lock();
        let parent_idx = (parent_pid as usize).checked_sub(1).ok_or(KernelError::InvalidArg)?;
        let parent = g.get(parent_idx).and_then(|s| s.as_ref()).ok_or(KernelError::InvalidArg)?;

        let child_space = duplicate_address_space(&parent.address_space, pfa)?;
        let parent_name_buf = parent.name;
        let parent_name_len = parent.name_len;

        let slot = match Self::find_free_slot(&g) {
            Some(s) => s,
            None => {
                free_address_space(&child_space, pfa);
                log::warn!("proc: fork from pid {} failed, table full", parent_pid);
                return Err(KernelError::NoMem);
            }
        };

        let child_pid = (slot as u32) + 1;
        let name = core::str::from_utf8(&parent_name_buf[..parent_name_len]).unwrap_or("");
        g[slot] = Some(self.new_process(child_pid, parent_pid, name, child_space));
        log::debug!("proc: pid {} forked from pid {}", child_pid, parent_pid);
        Ok(child_pid)
    }

    /// Record the exit code and wake anyone in `waitpid`. Does not tear
    /// anything down; `waitpid` is always the party that frees the slot
    /// and the address space, regardless of which of `exit`/`waitpid` is
    /// called first.
    pub fn exit(&self, pid: u32, code: i32) -> KResult<()> {
        let mut g = self.slots.lock();
        let idx = (pid as usize).checked_sub(1).ok_or(KernelError::InvalidArg)?;
        let p = g.get_mut(idx).and_then(|s| s.as_mut()).ok_or(KernelError::InvalidArg)?;
        p.state = ProcState::Zombie;
        log::debug!("proc: pid {} exiting with code {}", pid, code);
        // SAFETY: the table lock is dropped before touching the
        // per-process exit lock, since `Lock::acquire` can park and a
        // spinlock must never be held across a sleep. `p` outlives the
        // table lock for the same reason `waitpid` relies on: slots are
        // only ever freed by a waiter, under the table lock. `exit_code`
        // and `has_exited` have no interior mutability of their own and
        // are written here; `exit.lock`, held for the rest of this
        // function, is what makes that write race-free against the
        // `exit.has_exited` read in `waitpid`.
        let exit = &mut p.exit as *mut ExitRendezvous<'ic, 'sch>;
        drop(g);
        let exit = unsafe { &mut *exit };
        exit.lock.acquire();
        exit.exit_code = code & 0xFF;
        exit.has_exited = true;
        exit.cv.broadcast(&exit.lock);
        exit.lock.release();
        Ok(())
    }

    /// Block until `pid` has exited, then tear down its record and
    /// return its status. A `pid` that has already exited returns
    /// immediately.
    pub fn waitpid(&self, pid: u32, pfa: &PhysFrameAllocator) -> KResult<(u32, i32)> {
        let exit_code;
        {
            let g = self.slots.lock();
            let idx = (pid as usize).checked_sub(1).ok_or(KernelError::InvalidArg)?;
            let p = g.get(idx).and_then(|s| s.as_ref()).ok_or(KernelError::InvalidArg)?;
            // SAFETY: the table lock is dropped before blocking on the
            // per-process exit lock/cv, since a spinlock must never be
            // held across a sleep. `p` outlives the table lock because
            // process slots are only ever freed by the waiter itself,
            // below, under the table lock.
            let exit = &p.exit as *const ExitRendezvous<'ic, 'sch>;
            drop(g);
            let exit = unsafe { &*exit };
            exit.lock.acquire();
            while !exit.has_exited {
                exit.cv.wait(&exit.lock);
            }
            exit_code = exit.exit_code;
            exit.lock.release();
        }

        let mut g = self.slots.lock();
        let idx = (pid as usize) - 1;
        if let Some(p) = g[idx].as_mut() {
            p.waited = true;
            free_address_space(&p.address_space, pfa);
            p.state = ProcState::Reaped;
        }
        g[idx] = None;
        Ok((pid, exit_code))
    }

    /// Run `f` against `pid`'s record under the table lock. Used by the
    /// syscall layer for short, non-blocking per-process-table edits
    /// (e.g. claiming an `openfiles` slot); `f` must never sleep.
    pub fn with_process_mut<R>(&self, pid: u32, f: impl FnOnce(&mut Process<'ic, 'sch>) -> R) -> KResult<R> {
        let mut g = self.slots.lock();
        let idx = (pid as usize).checked_sub(1).ok_or(KernelError::InvalidArg)?;
        let p = g.get_mut(idx).and_then(|s| s.as_mut()).ok_or(KernelError::InvalidArg)?;
        Ok(f(p))
    }

    pub fn getpid(&self, pid: u32) -> KResult<u32> {
        let g = self.slots.lock();
        let idx = (pid as usize).checked_sub(1).ok_or(KernelError::InvalidArg)?;
        g.get(idx)
            .and_then(|s| s.as_ref())
            .map(|p| p.pid)
            .ok_or(KernelError::InvalidArg)
    }
}

fn duplicate_address_space(parent: &AddressSpace, pfa: &PhysFrameAllocator) -> KResult<AddressSpace> {
    let r1 = dup_region(&parent.region1, pfa)?;
    let r2 = match dup_region(&parent.region2, pfa) {
        Ok(r) => r,
        Err(e) => {
            free_region(&r1, pfa);
            return Err(e);
        }
    };
    let stack_kvaddr = pfa.alloc_kpages(crate::param::USERSTACK_PAGES);
    if stack_kvaddr == 0 {
        free_region(&r1, pfa);
        free_region(&r2, pfa);
        return Err(KernelError::NoMem);
    }
    Ok(AddressSpace::new(r1, r2, crate::pfa::kvaddr_to_paddr(stack_kvaddr)))
}

/// Allocates `r.npages` fresh frames (same vbase/npages as `r`, a new
/// physical backing) and returns the duplicated region descriptor.
/// Callers deal in physical addresses (`Region::pbase`); `alloc_kpages`
/// hands back a kernel virtual address, so every call site here converts.
fn dup_region(r: &crate::vm::Region, pfa: &PhysFrameAllocator) -> KResult<crate::vm::Region> {
    if r.npages == 0 {
        return Ok(*r);
    }
    let kvaddr = pfa.alloc_kpages(r.npages);
    if kvaddr == 0 {
        return Err(KernelError::NoMem);
    }
    Ok(crate::vm::Region {
        vbase: r.vbase,
        pbase: crate::pfa::kvaddr_to_paddr(kvaddr),
        npages: r.npages,
    })
}

fn free_region(r: &crate::vm::Region, pfa: &PhysFrameAllocator) {
    if r.npages > 0 {
        pfa.free_kpages(crate::pfa::paddr_to_kvaddr(r.pbase));
    }
}

fn free_address_space(space: &AddressSpace, pfa: &PhysFrameAllocator) {
    free_region(&space.region1, pfa);
    free_region(&space.region2, pfa);
    pfa.free_kpages(crate::pfa::paddr_to_kvaddr(space.stackpbase));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::PAGE_SIZE;
    use crate::pfa::RamSource;
    use crate::sched::std_sched::StdScheduler;
    use crate::spl::NullInterruptControl;
    use crate::vm::Region;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    static IC: NullInterruptControl = NullInterruptControl;

    struct FakeRam {
        total: usize,
        watermark: AtomicUsize,
    }

    impl RamSource for FakeRam {
        fn ram_getsize(&self) -> usize {
            self.total
        }
        fn ram_stealmem(&self, npages: usize) -> usize {
            let bytes = npages * PAGE_SIZE;
            let base = self.watermark.fetch_add(bytes, Ordering::SeqCst);
            if base + bytes > self.total {
                return 0;
            }
            base
        }
    }

    fn new_pfa(frames: usize) -> PhysFrameAllocator<'static, 'static> {
        let ram: &'static FakeRam = Box::leak(Box::new(FakeRam {
            total: frames * PAGE_SIZE,
            watermark: AtomicUsize::new(0),
        }));
        let pfa = PhysFrameAllocator::new(&IC, ram);
        pfa.bootstrap();
        pfa
    }

    fn sample_space(pfa: &PhysFrameAllocator) -> AddressSpace {
        let r1pbase = crate::pfa::kvaddr_to_paddr(pfa.alloc_kpages(2));
        let r2pbase = crate::pfa::kvaddr_to_paddr(pfa.alloc_kpages(2));
        let stackpbase = crate::pfa::kvaddr_to_paddr(pfa.alloc_kpages(crate::param::USERSTACK_PAGES));
        AddressSpace::new(
            Region { vbase: 0x40_0000, pbase: r1pbase, npages: 2 },
            Region { vbase: 0x50_0000, pbase: r2pbase, npages: 2 },
            stackpbase,
        )
    }

    #[test]
    fn fork_assigns_distinct_pids_and_backing() {
        let pfa: &'static _ = Box::leak(Box::new(new_pfa(256)));
        let sched: &'static StdScheduler = Box::leak(Box::new(StdScheduler::new()));
        let table: &'static ProcTable = Box::leak(Box::new(ProcTable::new(&IC, sched)));

        let space = sample_space(pfa);
        let parent_pid = table.spawn_init("init", space).unwrap();
        let child_pid = table.fork(parent_pid, pfa).unwrap();

        assert_ne!(parent_pid, child_pid);
        let g = table.slots.lock();
        let parent = g[(parent_pid - 1) as usize].as_ref().unwrap();
        let child = g[(child_pid - 1) as usize].as_ref().unwrap();
        assert_eq!(parent.address_space.region1.vbase, child.address_space.region1.vbase);
        assert_ne!(parent.address_space.region1.pbase, child.address_space.region1.pbase);
        assert_eq!(child.parent_pid, parent_pid);
    }

    #[test]
    fn exit_then_waitpid_returns_masked_code() {
        let pfa: &'static _ = Box::leak(Box::new(new_pfa(256)));
        let sched: &'static StdScheduler = Box::leak(Box::new(StdScheduler::new()));
        let table: &'static ProcTable = Box::leak(Box::new(ProcTable::new(&IC, sched)));

        let space = sample_space(pfa);
        let parent = table.spawn_init("init", space).unwrap();
        let child = table.fork(parent, pfa).unwrap();

        table.exit(child, 42).unwrap();
        let (waited_pid, status) = table.waitpid(child, pfa).unwrap();
        assert_eq!(waited_pid, child);
        assert_eq!(status, 42);
    }

    #[test]
    fn waitpid_before_exit_blocks_until_exit() {
        let pfa: &'static _ = Box::leak(Box::new(new_pfa(256)));
        let sched: &'static StdScheduler = Box::leak(Box::new(StdScheduler::new()));
        let table: &'static ProcTable = Box::leak(Box::new(ProcTable::new(&IC, sched)));

        let space = sample_space(pfa);
        let parent = table.spawn_init("init", space).unwrap();
        let child = table.fork(parent, pfa).unwrap();

        let waiter = thread::spawn(move || table.waitpid(child, pfa));

        thread::sleep(Duration::from_millis(20));
        table.exit(child, 7).unwrap();

        let (pid, status) = waiter.join().unwrap().unwrap();
        assert_eq!(pid, child);
        assert_eq!(status, 7);
    }

    #[test]
    fn exit_code_is_masked_to_one_byte() {
        let pfa: &'static _ = Box::leak(Box::new(new_pfa(256)));
        let sched: &'static StdScheduler = Box::leak(Box::new(StdScheduler::new()));
        let table: &'static ProcTable = Box::leak(Box::new(ProcTable::new(&IC, sched)));

        let space = sample_space(pfa);
        let parent = table.spawn_init("init", space).unwrap();
        let child = table.fork(parent, pfa).unwrap();

        table.exit(child, 0x1FF).unwrap();
        let (_, status) = table.waitpid(child, pfa).unwrap();
        assert_eq!(status, 0xFF);
    }
}
