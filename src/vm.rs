//! Virtual memory: address spaces and the software TLB fault handler.
//!
//! Translation is deliberately trivial: every region is a single
//! contiguous physical run, so `vaddr → paddr` is `(vaddr - vbase) +
//! pbase` arithmetic, never a page-table walk. The fault handler's only
//! real job is picking the region and refilling a software TLB slot.
//!
//! Address-space *lifecycle* (`activate`/`destroy`, i.e. actually pointing
//! the hart's MMU/TLB context at this address space and tearing it back
//! down) belongs to the excluded arch/loader layer and is reached through
//! the [`AddressSpaceOps`] capability.

use crate::param::{PAGE_SIZE, USERSTACK, USERSTACK_PAGES};
use crate::spl::{spl_high, spl_restore, InterruptControl};

/// One of the three fixed regions a process's virtual memory is built
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub vbase: usize,
    pub pbase: usize,
    pub npages: usize,
}

impl Region {
    fn contains(&self, vaddr: usize) -> bool {
        let vtop = self.vbase + self.npages * PAGE_SIZE;
        vaddr >= self.vbase && vaddr < vtop
    }

    fn translate(&self, vaddr: usize) -> usize {
        (vaddr - self.vbase) + self.pbase
    }
}

/// Three fixed regions: text/rodata (region 1), data (region 2), and a
/// fixed-size stack growing down from [`USERSTACK`].
#[derive(Debug, Clone, Copy)]
pub struct AddressSpace {
    pub region1: Region,
    pub region2: Region,
    pub stackpbase: usize,
}

impl AddressSpace {
    pub fn new(region1: Region, region2: Region, stackpbase: usize) -> Self {
        AddressSpace {
            region1,
            region2,
            stackpbase,
        }
    }

    fn stack_region(&self) -> Region {
        Region {
            vbase: USERSTACK - USERSTACK_PAGES * PAGE_SIZE,
            pbase: self.stackpbase,
            npages: USERSTACK_PAGES,
        }
    }

    /// Classify `vaddr` into one of the three regions and translate it to
    /// a physical address, or `None` if it falls outside all of them.
    fn translate(&self, vaddr: usize) -> Option<usize> {
        if self.region1.contains(vaddr) {
            Some(self.region1.translate(vaddr))
        } else if self.region2.contains(vaddr) {
            Some(self.region2.translate(vaddr))
        } else {
            let stack = self.stack_region();
            if stack.contains(vaddr) {
                Some(stack.translate(vaddr))
            } else {
                None
            }
        }
    }
}

/// Arch hook for actually pointing hardware at an [`AddressSpace`] (load
/// its root into whatever per-CPU register the ISA uses) and tearing it
/// down on process exit. Out of scope here; reached as a capability the
/// same way `VfsBackend` stands in for the VFS.
pub trait AddressSpaceOps {
    fn activate(&self, space: &AddressSpace);
    fn destroy(&self, space: &AddressSpace);
}

/// Why a fault was raised, mirroring the three MMU fault classes the
/// trap layer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Read,
    Write,
    ReadOnly,
}

/// One software-refilled TLB slot. `valid` stands in for "this slot
/// holds a real mapping"; `DIRTY`/`VALID` bits themselves are folded
/// into this type rather than modeled as raw flag bits, since no other
/// code needs them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlbEntry {
    pub vaddr: usize,
    pub paddr: usize,
    pub valid: bool,
    pub dirty: bool,
}

/// The per-CPU software TLB. Production supplies the real hart's TLB
/// through this trait (writes go straight to CSRs); tests use a plain
/// array.
pub trait Tlb {
    fn num_slots(&self) -> usize;
    fn read(&self, index: usize) -> TlbEntry;
    fn write(&mut self, index: usize, entry: TlbEntry);

    /// First slot with `valid == false`, if any.
    fn find_invalid(&self) -> Option<usize> {
        (0..self.num_slots()).find(|&i| !self.read(i).valid)
    }
}

/// Fixed-size array-backed [`Tlb`], sized by [`crate::param::NUM_TLB`].
pub struct ArrayTlb {
    slots: [TlbEntry; crate::param::NUM_TLB],
}

impl ArrayTlb {
    pub const fn new() -> Self {
        ArrayTlb {
            slots: [TlbEntry {
                vaddr: 0,
                paddr: 0,
                valid: false,
                dirty: false,
            }; crate::param::NUM_TLB],
        }
    }
}

impl Tlb for ArrayTlb {
    fn num_slots(&self) -> usize {
        self.slots.len()
    }
    fn read(&self, index: usize) -> TlbEntry {
        self.slots[index]
    }
    fn write(&mut self, index: usize, entry: TlbEntry) {
        self.slots[index] = entry;
    }
}

/// Handle a TLB-miss (or read-only violation) fault for `vaddr` against
/// `space`, installing a TLB entry on success.
///
/// `ReadOnly` faults are always fatal: every page this allocator installs
/// is read/write, so a read-only trap can only mean the trap layer itself
/// is confused, never a legitimate copy-on-write fault (there is no
/// copy-on-write support).
pub fn vm_fault(
    kind: FaultKind,
    vaddr: usize,
    space: Option<&AddressSpace>,
    tlb: &mut dyn Tlb,
    ic: &dyn InterruptControl,
) -> Result<(), crate::error::KernelError> {
    if kind == FaultKind::ReadOnly {
        panic!("vm_fault: VM_FAULT_READONLY should never occur (no COW pages)");
    }

    let space = space.ok_or(crate::error::KernelError::Fault)?;
    let vaddr = vaddr & !(PAGE_SIZE - 1);
    let paddr = space.translate(vaddr).ok_or(crate::error::KernelError::Fault)?;

    let was_enabled = spl_high(ic);
    let result = match tlb.find_invalid() {
        Some(slot) => {
            tlb.write(
                slot,
                TlbEntry {
                    vaddr,
                    paddr,
                    valid: true,
                    dirty: true,
                },
            );
            Ok(())
        }
        None => {
            log::warn!("vm_fault: no invalid TLB slot to refill for vaddr {:#x}", vaddr);
            Err(crate::error::KernelError::Fault)
        }
    };
    spl_restore(ic, was_enabled);
    result
}
