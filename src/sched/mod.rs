//! Scheduler capability and its host-only test double.
//!
//! The production scheduler (run queue, context switch) is out of scope
//! — this module only hosts the `std`-backed implementation used to
//! drive real concurrency in this crate's own test suite.

#[cfg(test)]
pub mod std_sched;
