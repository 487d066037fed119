//! Process-lifecycle syscalls: `fork`, `exit`, `waitpid`, `getpid`.

use crate::error::KResult;
use crate::Kernel;

/// `fork`: childpid in the parent, or an error. This crate has no arch
/// trampoline to actually resume as the child, so it only returns the
/// allocated child PID; the caller (the excluded trap layer) is
/// responsible for returning 0 into the child's own context.
pub fn sys_fork(k: &Kernel, caller_pid: u32) -> KResult<u32> {
    k.proc_table.fork(caller_pid, &k.pfa)
}

/// `exit(code)`: low 8 bits retained, never returns to the caller on a
/// real boot. The "never returns" half is the excluded scheduler's job;
/// this function only performs the rendezvous bookkeeping.
pub fn sys_exit(k: &Kernel, caller_pid: u32, code: i32) -> KResult<()> {
    k.proc_table.exit(caller_pid, code)
}

pub fn sys_waitpid(k: &Kernel, pid: u32) -> KResult<(u32, i32)> {
    k.proc_table.waitpid(pid, &k.pfa)
}

pub fn sys_getpid(k: &Kernel, caller_pid: u32) -> KResult<u32> {
    k.proc_table.getpid(caller_pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::OpenFileTable;
    use crate::param::PAGE_SIZE;
    use crate::pfa::{PhysFrameAllocator, RamSource};
    use crate::proc::ProcTable;
    use crate::sched::std_sched::StdScheduler;
    use crate::spl::NullInterruptControl;
    use crate::vm::{AddressSpace, Region};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    struct NoopVfs;
    impl crate::fs::VfsBackend for NoopVfs {
        fn open(&self, _path: &str, _flags: i32) -> KResult<crate::fs::VnodeHandle> {
            Err(crate::error::KernelError::NotImplemented)
        }
        fn close(&self, _vnode: crate::fs::VnodeHandle) {}
        fn read(&self, _vnode: crate::fs::VnodeHandle, _iobuf: &mut crate::fs::IoBuf) -> KResult<()> {
            Err(crate::error::KernelError::NotImplemented)
        }
        fn write(&self, _vnode: crate::fs::VnodeHandle, _iobuf: &mut crate::fs::IoBuf) -> KResult<()> {
            Err(crate::error::KernelError::NotImplemented)
        }
    }

    struct NoopConsole;
    impl crate::console::ConsoleBackend for NoopConsole {
        fn putch(&self, _c: u8) {}
        fn getch(&self) -> u8 {
            0
        }
    }

    fn new_kernel() -> Kernel<'static> {
        let ram: &'static FakeRam = Box::leak(Box::new(FakeRam {
            total: 256 * PAGE_SIZE,
            watermark: AtomicUsize::new(0),
        }));
        let sched: &'static StdScheduler = Box::leak(Box::new(StdScheduler::new()));
        let pfa = PhysFrameAllocator::new(&IC, ram);
        pfa.bootstrap();
        Kernel {
            proc_table: ProcTable::new(&IC, sched),
            pfa,
            openfiles: OpenFileTable::new(&IC),
            vfs: Box::leak(Box::new(NoopVfs)),
            console: Box::leak(Box::new(NoopConsole)),
            ic: &IC,
            sched,
        }
    }

    fn seed_init(k: &Kernel) -> u32 {
        let r1 = crate::pfa::kvaddr_to_paddr(k.pfa.alloc_kpages(2));
        let r2 = crate::pfa::kvaddr_to_paddr(k.pfa.alloc_kpages(2));
        let stack = crate::pfa::kvaddr_to_paddr(k.pfa.alloc_kpages(crate::param::USERSTACK_PAGES));
        let space = AddressSpace::new(
            Region { vbase: 0x40_0000, pbase: r1, npages: 2 },
            Region { vbase: 0x50_0000, pbase: r2, npages: 2 },
            stack,
        );
        k.proc_table.spawn_init("init", space).unwrap()
    }

    #[test]
    fn fork_exit_waitpid_scenario() {
        let k: &'static Kernel = Box::leak(Box::new(new_kernel()));
        let parent = seed_init(k);
        let child = sys_fork(k, parent).unwrap();
        assert_ne!(parent, child);

        sys_exit(k, child, 42).unwrap();
        let (pid, status) = sys_waitpid(k, child).unwrap();
        assert_eq!(pid, child);
        assert_eq!(status, 42);
    }

    #[test]
    fn getpid_matches_spawned_pid() {
        let k: &'static Kernel = Box::leak(Box::new(new_kernel()));
        let parent = seed_init(k);
        assert_eq!(sys_getpid(k, parent).unwrap(), parent);
    }
}
