//! Compile-time kernel tunables.
//!
//! Every knob a subsystem needs is a `pub const` here rather than a
//! runtime config file.

/// Bytes per physical/virtual frame.
pub const PAGE_SIZE: usize = 4096;

/// Number of CPUs this build supports.
pub const NCPU: usize = 8;

/// Maximum number of live processes.
pub const NPROC: usize = 64;

/// Maximum number of live threads (one per process in this build, plus
/// transient fork/exit traffic).
pub const NTHREAD: usize = NPROC;

/// Per-process open file descriptors.
pub const OPEN_MAX: usize = 20;

/// System-wide open file table size.
pub const SYS_MAX_OPEN_FILES_NUM: usize = 10 * OPEN_MAX;

/// Reserved descriptors: stdin, stdout, stderr.
pub const STDIN_FILENO: i32 = 0;
pub const STDOUT_FILENO: i32 = 1;
pub const STDERR_FILENO: i32 = 2;

/// First descriptor number handed out by `open`.
pub const MIN_FD: i32 = STDERR_FILENO + 1;

/// Number of pages reserved for a process's user stack.
pub const USERSTACK_PAGES: usize = 18;

/// Highest user virtual address; the stack grows down from here.
pub const USERSTACK: usize = 0x8000_0000;

/// Number of TLB slots the (soft-refilled) MMU exposes.
pub const NUM_TLB: usize = 64;

/// Number of wait-channel waiter slots each channel can hold at once.
pub const MAX_WAITERS: usize = NPROC;

/// Upper bound on physical frames this build can track.
///
/// `used`/`run_len` would ordinarily be sized at boot from the detected
/// RAM size; without a global allocator to heap-allocate them this crate
/// instead fixes their capacity here and treats more installed frames
/// than this bound as a boot-time configuration error.
pub const MAX_FRAMES: usize = 8192;
