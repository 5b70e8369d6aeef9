//! Cursor virtualization
//!
//! While a [`CursorPatch`] is enabled, every connection opened through the
//! [`Connector`] is a [`PatchedConnection`] whose cursors all point at the
//! transaction's single shared cursor. Code under test may open, commit,
//! roll back and close as it pleases: commit, rollback and close on a
//! [`PatchedCursor`] do nothing, and the real outcome is decided when the
//! transaction stops.
//!
//! Patched cursors only hold a weak reference; once the transaction stops
//! they fail with `TransactionStopped`.
//!
//! Patched cursors lock the shared cursor per call, so holding the
//! transaction's cursor lock while using a patched cursor deadlocks.

use crate::connector::{Connector, OverrideToken};
use crate::cursor::{Connection, ConnectionFactory, Cursor};
use crate::transaction::{SharedCursor, Transaction};
use parking_lot::Mutex;
use proctor_core::{ProctorError, ProctorResult, Row, Value};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

type WeakCursor = Weak<Mutex<Box<dyn Cursor>>>;

/// View of the transaction's cursor with commit/rollback/close disabled
pub struct PatchedCursor {
    inner: WeakCursor,
    database: String,
}

impl PatchedCursor {
    /// Create a view of `cursor`
    pub fn new(cursor: &SharedCursor, database: impl Into<String>) -> Self {
        Self {
            inner: Arc::downgrade(cursor),
            database: database.into(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut dyn Cursor) -> ProctorResult<R>) -> ProctorResult<R> {
        let cursor = self.inner.upgrade().ok_or(ProctorError::TransactionStopped)?;
        let mut guard = cursor.lock();
        let result = f(&mut **guard);
        result
    }
}

impl Cursor for PatchedCursor {
    fn execute(&mut self, query: &str, params: &[Value]) -> ProctorResult<u64> {
        self.with(|c| c.execute(query, params))
    }

    fn fetch_one(&mut self) -> ProctorResult<Option<Row>> {
        self.with(|c| c.fetch_one())
    }

    fn fetch_all(&mut self) -> ProctorResult<Vec<Row>> {
        self.with(|c| c.fetch_all())
    }

    fn row_count(&self) -> u64 {
        self.with(|c| Ok(c.row_count())).unwrap_or(0)
    }

    fn description(&self) -> Vec<String> {
        self.with(|c| Ok(c.description())).unwrap_or_default()
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn commit(&mut self) -> ProctorResult<()> {
        trace!(database = %self.database, "ignored commit on patched cursor");
        Ok(())
    }

    fn rollback(&mut self) -> ProctorResult<()> {
        trace!(database = %self.database, "ignored rollback on patched cursor");
        Ok(())
    }

    fn close(&mut self) -> ProctorResult<()> {
        trace!(database = %self.database, "ignored close on patched cursor");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.strong_count() == 0
    }

    fn set_autocommit(&mut self, enabled: bool) -> ProctorResult<()> {
        self.with(|c| c.set_autocommit(enabled))
    }
}

/// Connection handing out [`PatchedCursor`]s
pub struct PatchedConnection {
    cursor: WeakCursor,
    database: String,
}

impl Connection for PatchedConnection {
    fn database(&self) -> &str {
        &self.database
    }

    fn cursor(&mut self) -> ProctorResult<Box<dyn Cursor>> {
        if self.cursor.strong_count() == 0 {
            return Err(ProctorError::TransactionStopped);
        }
        Ok(Box::new(PatchedCursor {
            inner: self.cursor.clone(),
            database: self.database.clone(),
        }))
    }

    fn close(&mut self) -> ProctorResult<()> {
        Ok(())
    }
}

/// Factory funnelling every connection into the transaction's cursor
pub struct SharedCursorFactory {
    cursor: WeakCursor,
    database: String,
}

impl SharedCursorFactory {
    /// Factory over the cursor of a started transaction
    pub fn new(txn: &Transaction) -> ProctorResult<Self> {
        let cursor = txn.cursor()?;
        let database = txn.database().ok_or(ProctorError::NotStarted)?;
        Ok(Self {
            cursor: Arc::downgrade(&cursor),
            database: database.to_string(),
        })
    }
}

impl ConnectionFactory for SharedCursorFactory {
    fn connect(&self, database: &str) -> ProctorResult<Box<dyn Connection>> {
        if database != self.database {
            debug!(
                requested = %database,
                database = %self.database,
                "redirecting connection to the transaction database"
            );
        }
        Ok(Box::new(PatchedConnection {
            cursor: self.cursor.clone(),
            database: self.database.clone(),
        }))
    }
}

/// Enabled cursor interception; disabled on [`disable`](Self::disable) or drop
#[must_use = "interception stops as soon as the patch drops"]
pub struct CursorPatch {
    connector: Arc<Connector>,
    token: Option<OverrideToken>,
}

impl CursorPatch {
    /// Route every connection of `connector` to `txn`'s cursor
    ///
    /// # Errors
    ///
    /// `NotStarted` if `txn` is stopped.
    pub fn enable(connector: &Arc<Connector>, txn: &Transaction) -> ProctorResult<Self> {
        let factory = SharedCursorFactory::new(txn)?;
        let token = connector.push_override(Arc::new(factory));
        Ok(Self {
            connector: Arc::clone(connector),
            token: Some(token),
        })
    }

    /// Check if still enabled
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Restore the previous factory
    ///
    /// # Errors
    ///
    /// `PatchMismatch` when already disabled or when a patch enabled later
    /// is still active; the patch stays enabled in the latter case.
    pub fn disable(&mut self) -> ProctorResult<()> {
        let token = self
            .token
            .ok_or_else(|| ProctorError::PatchMismatch("cursor patch already disabled".into()))?;
        self.connector.pop_override(token)?;
        self.token = None;
        Ok(())
    }
}

impl Drop for CursorPatch {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        if let Err(e) = self.connector.pop_override(token) {
            warn!(%token, error = %e, "cursor patch dropped out of order");
            self.connector.remove_override(token);
        }
    }
}

/// Run `f` with cursors of `connector` routed to `txn`
///
/// Interception is removed afterwards, also when `f` panics.
pub fn with_patched_cursors<R>(
    connector: &Arc<Connector>,
    txn: &Transaction,
    f: impl FnOnce() -> R,
) -> ProctorResult<R> {
    let mut patch = CursorPatch::enable(connector, txn)?;
    let result = f();
    patch.disable()?;
    Ok(result)
}
