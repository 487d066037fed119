//! Physical frame allocator.
//!
//! A first-fit, contiguous-run allocator over two parallel arrays, `used`
//! and `run_len`. The post-init scan-and-reserve is serialized by a
//! single [`SpinLock`] wrapping the whole state; there is no code path
//! that mutates the bitmap without holding it.
//!
//! Bootstrap-phase allocation (before the bitmap is ready) and post-init
//! allocation are kept as two explicit methods rather than one branching
//! on a flag, since their contracts differ: bootstrap allocations are
//! permanent and untracked, post-init ones are trackable and freeable.
//!
//! RAM discovery and the raw steal-memory primitive belong to the boot
//! layer (out of scope) and are reached through the [`RamSource`]
//! capability, the same pattern `VfsBackend`/`ConsoleBackend` use elsewhere.

use crate::param::{MAX_FRAMES, PAGE_SIZE};
use crate::spinlock::{holds_no_spinlocks, SpinLock};
use crate::spl::InterruptControl;

/// MIPS-style kseg0 identity mapping: physical address `p` is always
/// addressable at kernel virtual address `p + KSEG0_BASE`. The real
/// constant and any TLB/cache implications belong to the arch layer; this
/// crate only needs the arithmetic to turn a frame index back into the
/// kernel virtual address `alloc_kpages` promises its caller.
pub const KSEG0_BASE: usize = 0x8000_0000;

pub fn paddr_to_kvaddr(paddr: usize) -> usize {
    paddr + KSEG0_BASE
}

pub fn kvaddr_to_paddr(kvaddr: usize) -> usize {
    kvaddr - KSEG0_BASE
}

/// RAM geometry and the raw bump-allocator used before the bitmap exists.
///
/// Implemented by the boot/arch layer in a real boot; a fixed-size
/// in-memory stand-in backs this crate's own tests.
pub trait RamSource: Sync {
    /// Total installed RAM, in bytes.
    fn ram_getsize(&self) -> usize;
    /// Bump-allocate `npages` contiguous frames from the untracked tail of
    /// RAM, returning their physical base address, or 0 if exhausted.
    fn ram_stealmem(&self, npages: usize) -> usize;
}

struct PfaState {
    used: [bool; MAX_FRAMES],
    run_len: [usize; MAX_FRAMES],
    n_frames: usize,
    first_free: usize,
    initialized: bool,
}

impl PfaState {
    const fn new() -> Self {
        PfaState {
            used: [false; MAX_FRAMES],
            run_len: [0; MAX_FRAMES],
            n_frames: 0,
            first_free: 0,
            initialized: false,
        }
    }
}

/// Contiguous physical frame allocator, serving both kernel heap growth
/// and user-process page frames.
pub struct PhysFrameAllocator<'ic, 'rs> {
    state: SpinLock<'ic, PfaState>,
    ram: &'rs dyn RamSource,
}

impl<'ic, 'rs> PhysFrameAllocator<'ic, 'rs> {
    pub const fn new(ic: &'ic dyn InterruptControl, ram: &'rs dyn RamSource) -> Self {
        PhysFrameAllocator {
            state: SpinLock::new("pfa", ic, PfaState::new()),
            ram,
        }
    }

    /// Computes `N = ram_getsize() / P`, steals the kernel image's
    /// bootstrap heap via `ram_stealmem`, and marks the frames below
    /// `first_free` permanently allocated. Must run once, before any other
    /// allocator call, and before interrupts are enabled.
    pub fn bootstrap(&self) {
        let mut st = self.state.lock();
        assert!(!st.initialized, "pfa: bootstrap called twice");

        let n_frames = self.ram.ram_getsize() / PAGE_SIZE;
        assert!(
            n_frames <= MAX_FRAMES,
            "pfa: {} frames exceeds build capacity {}",
            n_frames,
            MAX_FRAMES
        );
        st.n_frames = n_frames;

        // The kernel image plus whatever bootstrap heap ram_stealmem has
        // already handed out sits below this boundary; ram_getsize()
        // reports the size *after* those allocations, so first_free is
        // simply "how far the bump allocator has moved so far" — probed
        // by stealing zero pages, which just returns the current watermark.
        let first_free_paddr = self.ram.ram_stealmem(0);
        let first_free = first_free_paddr / PAGE_SIZE;
        st.first_free = first_free;
        for i in 0..first_free.min(MAX_FRAMES) {
            st.used[i] = true;
        }
        st.initialized = true;
        log::info!(
            "pfa: bootstrap done, {} frames total, {} reserved below first_free",
            n_frames,
            first_free
        );
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Pre-init allocation: steals `n` pages directly from [`RamSource`]
    /// and returns their kernel virtual address. Never freed; calling
    /// [`free_kpages`](Self::free_kpages) on the result is a no-op.
    fn alloc_bootstrap(&self, n: usize) -> usize {
        let paddr = self.ram.ram_stealmem(n);
        if paddr == 0 {
            return 0;
        }
        paddr_to_kvaddr(paddr)
    }

    /// First-fit scan for `n` consecutive free frames, reserving them
    /// under the allocator's own lock for the whole scan. Returns 0 if no
    /// run of that length exists.
    ///
    /// Panics if called while already holding a spinlock or with
    /// interrupts disabled (`can_sleep`), since a long scan should not run
    /// with preemption/interrupts masked.
    fn alloc_postinit(&self, n: usize) -> usize {
        assert!(n > 0, "pfa: alloc_kpages(0)");
        assert!(
            holds_no_spinlocks(),
            "pfa: alloc_kpages called while holding a spinlock"
        );

        let mut st = self.state.lock();
        let n_frames = st.n_frames;
        let mut i = 0;
        while i + n <= n_frames {
            if (i..i + n).all(|j| !st.used[j]) {
                for j in i..i + n {
                    st.used[j] = true;
                }
                st.run_len[i] = n;
                let paddr = i * PAGE_SIZE;
                return paddr_to_kvaddr(paddr);
            }
            i += 1;
        }
        0
    }

    /// Allocate `n` contiguous frames, returning a kernel virtual address,
    /// or 0 if no fit exists. Dispatches on whether [`bootstrap`](Self::bootstrap)
    /// has run yet.
    pub fn alloc_kpages(&self, n: usize) -> usize {
        if self.is_initialized() {
            self.alloc_postinit(n)
        } else {
            self.alloc_bootstrap(n)
        }
    }

    /// Free a run previously returned by `alloc_kpages` post-init. A
    /// no-op on addresses handed out during bootstrap (they carry no
    /// `run_len` entry and are never tracked).
    pub fn free_kpages(&self, kvaddr: usize) {
        let mut st = self.state.lock();
        if !st.initialized {
            return;
        }
        let paddr = kvaddr_to_paddr(kvaddr);
        let i = paddr / PAGE_SIZE;
        if i >= st.n_frames || !st.used[i] {
            return;
        }
        let run = st.run_len[i];
        if run == 0 {
            // Not a run-start address; freeing from the middle of a run
            // is not supported.
            return;
        }
        assert!(i + run <= st.n_frames, "pfa: free run overruns table");
        for j in i..i + run {
            st.used[j] = false;
        }
        st.run_len[i] = 0;
    }

    #[cfg(test)]
    fn frames_used(&self) -> usize {
        let st = self.state.lock();
        st.used[..st.n_frames].iter().filter(|&&u| u).count()
    }
}
