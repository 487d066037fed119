//! Kernel-wide error taxonomy.
//!
//! One flat, `no_std`-friendly enum instead of `std::error::Error` trait
//! objects: every fallible public operation in this crate returns
//! `Result<T, KernelError>`. Invariant violations treated as fatal
//! (lock misuse, double-free) are asserted/panicked, never funneled
//! through this enum.

use core::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KernelError {
    /// Bad, unopened, or not-owned-by-this-process file descriptor.
    BadFd,
    /// No physical frames / kernel heap / process slots available.
    NoMem,
    /// A `VfsBackend`/console operation failed.
    IoError,
    /// Bad user pointer or out-of-region virtual address.
    Fault,
    /// Malformed argument to a syscall-level operation.
    InvalidArg,
    /// Recognized but unimplemented surface.
    NotImplemented,
    /// No free slot in the system or per-process open-file table.
    TableFull,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::BadFd => "bad file descriptor",
            KernelError::NoMem => "out of memory",
            KernelError::IoError => "I/O error",
            KernelError::Fault => "bad address",
            KernelError::InvalidArg => "invalid argument",
            KernelError::NotImplemented => "not implemented",
            KernelError::TableFull => "table full",
        };
        f.write_str(msg)
    }
}

pub type KResult<T> = Result<T, KernelError>;
