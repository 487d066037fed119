//! Console character I/O capability.
//!
//! `putch`/`getch` are the only console operations this crate needs: fd 0
//! reads one character at a time from the console, fds 1/2 write to it,
//! bypassing the VFS entirely. The UART/device driver backing these calls
//! is out of scope.

pub trait ConsoleBackend: Sync {
    fn putch(&self, c: u8);
    fn getch(&self) -> u8;
}
