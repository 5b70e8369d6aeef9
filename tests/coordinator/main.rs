//! Coordinator Integration Tests
//!
//! End-to-end runs against the in-memory runtime: ordering, database
//! lifecycle, installation, failure isolation and reporting.

#[path = "../common/mod.rs"]
mod common;

mod databases;
mod observers;
mod scenarios;
