//! Execute observers
//!
//! Observers see every statement executed through a connection handed out by
//! the [`Connector`](crate::Connector). Some code paths must run unobserved
//! (resolving a user's context while a query counter is active, for
//! instance); [`ExecuteHooks::suppress`] silences the observers on the
//! calling thread until the returned guard drops. Other threads keep
//! notifying.

use crate::cursor::{Connection, Cursor};
use parking_lot::RwLock;
use proctor_core::{ProctorResult, Row, Value};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    /// Number of live suppress guards on this thread
    static SUPPRESSED: Cell<usize> = const { Cell::new(0) };
}

/// Receives a callback before each executed statement
pub trait ExecuteObserver: Send + Sync {
    /// Called before `query` runs on `database`
    fn before_execute(&self, database: &str, query: &str, params: &[Value]);
}

/// Registry of execute observers
#[derive(Default)]
pub struct ExecuteHooks {
    observers: RwLock<Vec<Arc<dyn ExecuteObserver>>>,
}

impl ExecuteHooks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn register(&self, observer: Arc<dyn ExecuteObserver>) {
        self.observers.write().push(observer);
    }

    /// Remove a previously registered observer
    pub fn unregister(&self, observer: &Arc<dyn ExecuteObserver>) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    /// Number of attached observers
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Check if no observer is attached
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Silence observers on the calling thread until the guard drops
    ///
    /// Guards nest; registration is unaffected.
    pub fn suppress(&self) -> SuppressGuard<'_> {
        let depth = SUPPRESSED.with(|s| {
            s.set(s.get() + 1);
            s.get()
        });
        tracing::trace!(depth, "execute observers suppressed on this thread");
        SuppressGuard {
            _hooks: PhantomData,
        }
    }

    /// Check if observers are silenced on the calling thread
    pub fn is_suppressed() -> bool {
        SUPPRESSED.with(|s| s.get() > 0)
    }

    fn notify(&self, database: &str, query: &str, params: &[Value]) {
        if Self::is_suppressed() {
            return;
        }
        // clone out so observers may execute statements themselves
        let observers: Vec<_> = self.observers.read().clone();
        for observer in observers {
            observer.before_execute(database, query, params);
        }
    }
}

/// Lifts the thread's suppression on drop
///
/// Not `Send`: it must drop on the thread it silenced.
#[must_use = "observers are restored as soon as the guard drops"]
pub struct SuppressGuard<'a> {
    _hooks: PhantomData<(&'a ExecuteHooks, *const ())>,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        SUPPRESSED.with(|s| s.set(s.get().saturating_sub(1)));
    }
}

/// Cursor wrapper notifying the hooks before each statement
pub struct ObservedCursor {
    inner: Box<dyn Cursor>,
    hooks: Arc<ExecuteHooks>,
}

impl ObservedCursor {
    /// Wrap `inner`
    pub fn new(inner: Box<dyn Cursor>, hooks: Arc<ExecuteHooks>) -> Self {
        Self { inner, hooks }
    }
}

impl Cursor for ObservedCursor {
    fn execute(&mut self, query: &str, params: &[Value]) -> ProctorResult<u64> {
        self.hooks.notify(self.inner.database(), query, params);
        self.inner.execute(query, params)
    }

    fn fetch_one(&mut self) -> ProctorResult<Option<Row>> {
        self.inner.fetch_one()
    }

    fn fetch_all(&mut self) -> ProctorResult<Vec<Row>> {
        self.inner.fetch_all()
    }

    fn row_count(&self) -> u64 {
        self.inner.row_count()
    }

    fn description(&self) -> Vec<String> {
        self.inner.description()
    }

    fn database(&self) -> &str {
        self.inner.database()
    }

    fn commit(&mut self) -> ProctorResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> ProctorResult<()> {
        self.inner.rollback()
    }

    fn close(&mut self) -> ProctorResult<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn set_autocommit(&mut self, enabled: bool) -> ProctorResult<()> {
        self.inner.set_autocommit(enabled)
    }
}

/// Connection wrapper whose cursors are observed
pub struct ObservedConnection {
    inner: Box<dyn Connection>,
    hooks: Arc<ExecuteHooks>,
}

impl ObservedConnection {
    /// Wrap `inner`
    pub fn new(inner: Box<dyn Connection>, hooks: Arc<ExecuteHooks>) -> Self {
        Self { inner, hooks }
    }
}

impl Connection for ObservedConnection {
    fn database(&self) -> &str {
        self.inner.database()
    }

    fn cursor(&mut self) -> ProctorResult<Box<dyn Cursor>> {
        let cursor = self.inner.cursor()?;
        Ok(Box::new(ObservedCursor::new(cursor, Arc::clone(&self.hooks))))
    }

    fn close(&mut self) -> ProctorResult<()> {
        self.inner.close()
    }
}
