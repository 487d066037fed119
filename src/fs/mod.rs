//! System-wide open-file table and the syscall-facing FD contract.
//!
//! The actual filesystem — vnodes, on-disk layout, directory lookup — is
//! out of scope and reached entirely through [`VfsBackend`]. This module
//! only owns the bookkeeping a real kernel keeps *above* the VFS: the
//! table of open instances and per-process FD-to-instance mapping.

use crate::error::{KernelError, KResult};
use crate::param::{MIN_FD, SYS_MAX_OPEN_FILES_NUM};
use crate::spinlock::SpinLock;
use crate::spl::InterruptControl;

/// Opaque vnode handle. The real shape (inode number, disk pointer, ...)
/// belongs to the VFS; this crate never inspects it, only passes it
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VnodeHandle(pub u64);

/// Which direction an I/O buffer moves: into the kernel (write) or out
/// of it (read).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    Read,
    Write,
}

/// A kernel I/O buffer as handed to `VfsBackend::read`/`write`: a
/// borrowed scratch region, not an owned allocation, since this crate has
/// no global allocator.
pub struct IoBuf<'a> {
    pub buf: &'a mut [u8],
    pub offset: u64,
    pub direction: IoDirection,
    /// Bytes the backend did *not* transfer (short read/write). The
    /// OpenFile offset must advance by `len - residual`, not by the
    /// requested length.
    pub residual: usize,
}

impl IoBuf<'_> {
    pub fn transferred(&self) -> usize {
        self.buf.len() - self.residual
    }
}

/// The VFS capability this crate depends on for every operation that
/// touches an actual file.
pub trait VfsBackend: Sync {
    fn open(&self, path: &str, flags: i32) -> KResult<VnodeHandle>;
    fn close(&self, vnode: VnodeHandle);
    fn read(&self, vnode: VnodeHandle, iobuf: &mut IoBuf) -> KResult<()>;
    fn write(&self, vnode: VnodeHandle, iobuf: &mut IoBuf) -> KResult<()>;
}

/// One system-wide open-file instance. Free iff `refcount == 0`.
#[derive(Debug, Clone, Copy)]
struct OpenFile {
    vnode: VnodeHandle,
    offset: u64,
    refcount: u32,
}

/// System-wide table of [`OpenFile`] instances, indexed `0..
/// SYS_MAX_OPEN_FILES_NUM`. Per-process file descriptor tables
/// (`openfiles[OPEN_MAX]` on [`crate::proc::Process`]) store indices into
/// this table, shifted by [`MIN_FD`] at the syscall boundary.
pub struct OpenFileTable<'ic> {
    entries: SpinLock<'ic, [Option<OpenFile>; SYS_MAX_OPEN_FILES_NUM]>,
}

impl<'ic> OpenFileTable<'ic> {
    pub fn new(ic: &'ic dyn InterruptControl) -> Self {
        OpenFileTable {
            entries: SpinLock::new("openfiles", ic, [None; SYS_MAX_OPEN_FILES_NUM]),
        }
    }

    /// Linear scan for a free (`refcount == 0`) slot, claiming it for
    /// `vnode` at offset 0 with `refcount = 1`.
    pub fn allocate(&self, vnode: VnodeHandle) -> KResult<usize> {
        let mut g = self.entries.lock();
        let slot = g.iter().position(|e| e.is_none()).ok_or(KernelError::TableFull)?;
        g[slot] = Some(OpenFile {
            vnode,
            offset: 0,
            refcount: 1,
        });
        Ok(slot)
    }

    pub fn vnode_of(&self, index: usize) -> KResult<VnodeHandle> {
        self.entries
            .lock()
            .get(index)
            .and_then(|e| e.as_ref())
            .map(|e| e.vnode)
            .ok_or(KernelError::BadFd)
    }

    pub fn offset_of(&self, index: usize) -> KResult<u64> {
        self.entries
            .lock()
            .get(index)
            .and_then(|e| e.as_ref())
            .map(|e| e.offset)
            .ok_or(KernelError::BadFd)
    }

    pub fn advance_offset(&self, index: usize, by: u64) -> KResult<()> {
        let mut g = self.entries.lock();
        let e = g.get_mut(index).and_then(|e| e.as_mut()).ok_or(KernelError::BadFd)?;
        e.offset += by;
        Ok(())
    }

    /// Drop one reference. Returns the vnode to close iff this was the
    /// last reference (caller closes it via [`VfsBackend::close`] outside
    /// this table's lock — never call the VFS while holding
    /// `openfiles_spinlock`).
    pub fn release(&self, index: usize) -> KResult<Option<VnodeHandle>> {
        let mut g = self.entries.lock();
        let e = g.get_mut(index).ok_or(KernelError::BadFd)?;
        let entry = e.as_mut().ok_or(KernelError::BadFd)?;
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let vnode = entry.vnode;
            *e = None;
            Ok(Some(vnode))
        } else {
            Ok(None)
        }
    }

    #[cfg(test)]
    fn refcount(&self, index: usize) -> u32 {
        self.entries.lock()[index].map(|e| e.refcount).unwrap_or(0)
    }
}

/// Syscall-visible FD ↔ system-table-index conversion: per-process FDs
/// shift by [`MIN_FD`].
pub fn fd_to_index(fd: i32) -> KResult<usize> {
    if fd < MIN_FD {
        return Err(KernelError::BadFd);
    }
    Ok((fd - MIN_FD) as usize)
}

pub fn index_to_fd(index: usize) -> i32 {
    index as i32 + MIN_FD
}
