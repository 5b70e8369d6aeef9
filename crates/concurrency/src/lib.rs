//! Transaction isolation for tests
//!
//! This crate virtualizes database access so that deeply nested code can open,
//! commit and close connections while every statement actually runs on one
//! cursor owned by the test's transaction:
//! - cursor: Cursor / Connection / ConnectionFactory traits
//! - connector: factory override stack every connection goes through
//! - hooks: execute observers and their suppression
//! - transaction: per-thread Transaction context
//! - patch: CursorPatch and patched cursors
//! - memory: in-memory database server implementing the traits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connector;
pub mod cursor;
pub mod hooks;
pub mod memory;
pub mod patch;
pub mod transaction;

pub use connector::{Connector, OverrideToken};
pub use cursor::{Connection, ConnectionFactory, Cursor};
pub use hooks::{ExecuteHooks, ExecuteObserver, ObservedConnection, ObservedCursor, SuppressGuard};
pub use memory::MemoryServer;
pub use patch::{
    with_patched_cursors, CursorPatch, PatchedConnection, PatchedCursor, SharedCursorFactory,
};
pub use transaction::{
    ContextResolver, Disposition, SharedCursor, StaticContext, Transaction, TransactionOptions,
    TransactionScope,
};
