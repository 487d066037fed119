//! Thin syscall surface: adapters over the process, fs, and console
//! layers. Argument marshalling (fetching words out of the trapframe/user
//! registers) is arch ABI plumbing and out of scope here; every function
//! here already takes decoded arguments.

pub mod sysfile;
pub mod sysproc;

pub use sysfile::{sys_close, sys_open, sys_read, sys_write};
pub use sysproc::{sys_exit, sys_fork, sys_getpid, sys_waitpid};
