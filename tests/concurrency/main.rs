//! Concurrency Integration Tests
//!
//! Per-thread transaction slot, patched cursors and helper threads.

#[path = "../common/mod.rs"]
mod common;

mod helper_threads;
mod patched_cursors;
mod transaction_lifecycle;
