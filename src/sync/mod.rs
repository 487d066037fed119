//! Blocking synchronization primitives built on [`crate::spinlock`] and
//! [`crate::wchan`]: semaphores, two interchangeable lock implementations,
//! and Mesa-semantics condition variables.

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::CondVar;
pub use lock::Lock;
pub use semaphore::Semaphore;
