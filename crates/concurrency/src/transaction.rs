//! Transaction context
//!
//! A [`Transaction`] owns one connection and one cursor on a database for
//! the duration of a test. At most one transaction may be started per
//! thread; the thread-local slot records which one. The cursor is shared
//! ([`SharedCursor`]) so the virtualization layer can hand out views of it.
//!
//! # Lifecycle
//!
//! ```text
//! stopped --start()--> started --stop()--> stopped
//! ```
//!
//! `start` on a started thread fails without touching the active context.
//! `stop` first takes every field out and frees the slot, then commits or
//! rolls back and closes; a failure while closing still leaves the context
//! stopped.

use crate::connector::Connector;
use crate::cursor::{Connection, Cursor};
use parking_lot::Mutex;
use proctor_core::{ExecutionContext, ProctorError, ProctorResult, UserId};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// The transaction's cursor, shared with patched cursors
pub type SharedCursor = Arc<Mutex<Box<dyn Cursor>>>;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct SlotEntry {
    id: u64,
    database: String,
}

thread_local! {
    /// The transaction started on this thread, if any
    static ACTIVE: RefCell<Option<SlotEntry>> = const { RefCell::new(None) };
}

/// What `stop` does with pending writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Make the test's writes durable
    Commit,
    /// Discard the test's writes
    #[default]
    Rollback,
}

/// Resolves the execution context of a user
pub trait ContextResolver: Send + Sync {
    /// Read `user`'s context (language, timezone, ...) through `cursor`
    fn resolve(&self, cursor: &mut dyn Cursor, user: UserId) -> ProctorResult<ExecutionContext>;
}

/// Resolver returning a fixed context
#[derive(Debug, Clone, Default)]
pub struct StaticContext(pub ExecutionContext);

impl ContextResolver for StaticContext {
    fn resolve(&self, _cursor: &mut dyn Cursor, _user: UserId) -> ProctorResult<ExecutionContext> {
        Ok(self.0.clone())
    }
}

/// Options for [`Transaction::start_with`]
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Acting user
    pub user: UserId,
    /// Explicit context; resolved from the user when absent
    pub context: Option<ExecutionContext>,
    /// What stop does with pending writes
    pub disposition: Disposition,
}

impl TransactionOptions {
    /// Set the acting user
    pub fn user(mut self, user: UserId) -> Self {
        self.user = user;
        self
    }

    /// Set an explicit context
    pub fn context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the stop disposition
    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }
}

struct Active {
    database: String,
    connection: Box<dyn Connection>,
    cursor: SharedCursor,
    user: UserId,
    context: ExecutionContext,
    disposition: Disposition,
}

/// Per-thread transaction context
///
/// Not `Send`: the context is bound to the thread whose slot it occupies.
pub struct Transaction {
    id: u64,
    connector: Arc<Connector>,
    resolver: Arc<dyn ContextResolver>,
    active: Option<Active>,
    _not_send: PhantomData<*const ()>,
}

impl Transaction {
    /// Create a stopped context
    pub fn new(connector: Arc<Connector>, resolver: Arc<dyn ContextResolver>) -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            connector,
            resolver,
            active: None,
            _not_send: PhantomData,
        }
    }

    /// Database of the transaction started on the current thread
    pub fn current_database() -> Option<String> {
        ACTIVE.with(|slot| slot.borrow().as_ref().map(|e| e.database.clone()))
    }

    /// Start on `database` as the root user with a resolved context
    pub fn start(&mut self, database: &str) -> ProctorResult<()> {
        self.start_with(database, TransactionOptions::default())
    }

    /// Start on `database` with explicit options
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` if this or any other context is started on the
    ///   thread; nothing is modified
    /// - connection or context resolution failures; the context stays stopped
    pub fn start_with(&mut self, database: &str, options: TransactionOptions) -> ProctorResult<()> {
        if let Some(active) = &self.active {
            return Err(ProctorError::AlreadyStarted {
                database: active.database.clone(),
            });
        }
        if let Some(db) = Self::current_database() {
            return Err(ProctorError::AlreadyStarted { database: db });
        }

        let mut connection = self.connector.connect_direct(database)?;
        let cursor = match connection.cursor() {
            Ok(cursor) => cursor,
            Err(e) => {
                let _ = connection.close();
                return Err(e);
            }
        };
        let cursor: SharedCursor = Arc::new(Mutex::new(cursor));

        let context = match options.context {
            Some(context) => context,
            None => {
                let resolved = {
                    let _quiet = self.connector.hooks().suppress();
                    let mut guard = cursor.lock();
                    let resolved = self.resolver.resolve(&mut **guard, options.user);
                    resolved
                };
                match resolved {
                    Ok(context) => context,
                    Err(e) => {
                        let _ = cursor.lock().close();
                        let _ = connection.close();
                        return Err(e);
                    }
                }
            }
        };

        ACTIVE.with(|slot| {
            *slot.borrow_mut() = Some(SlotEntry {
                id: self.id,
                database: database.to_string(),
            })
        });
        debug!(
            database = %database,
            user = %options.user,
            disposition = ?options.disposition,
            "transaction started"
        );
        self.active = Some(Active {
            database: database.to_string(),
            connection,
            cursor,
            user: options.user,
            context,
            disposition: options.disposition,
        });
        Ok(())
    }

    /// Start and return a guard that stops on drop
    pub fn start_scoped(
        &mut self,
        database: &str,
        options: TransactionOptions,
    ) -> ProctorResult<TransactionScope<'_>> {
        self.start_with(database, options)?;
        Ok(TransactionScope { txn: self })
    }

    /// Stop, applying the disposition and closing cursor and connection
    ///
    /// A no-op when already stopped. The context is empty afterwards even
    /// when an error is returned.
    pub fn stop(&mut self) -> ProctorResult<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.as_ref().map(|e| e.id) == Some(self.id) {
                *slot = None;
            }
        });

        let Active {
            database,
            mut connection,
            cursor,
            disposition,
            ..
        } = active;

        let mut first_error = None;
        {
            let mut cursor = cursor.lock();
            let applied = match disposition {
                Disposition::Commit => cursor.commit(),
                Disposition::Rollback => cursor.rollback(),
            };
            for result in [applied, cursor.close()] {
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Err(e) = connection.close() {
            first_error.get_or_insert(e);
        }
        drop(cursor);

        match first_error {
            None => {
                debug!(database = %database, disposition = ?disposition, "transaction stopped");
                Ok(())
            }
            Some(e) => {
                warn!(database = %database, error = %e, "transaction stopped with errors");
                Err(e)
            }
        }
    }

    /// Check the context is empty
    pub fn assert_stopped(&self) -> ProctorResult<()> {
        if self.active.is_some() {
            return Err(ProctorError::NotStopped { field: "database" });
        }
        let owns_slot = ACTIVE.with(|slot| slot.borrow().as_ref().map(|e| e.id) == Some(self.id));
        if owns_slot {
            return Err(ProctorError::NotStopped { field: "thread slot" });
        }
        Ok(())
    }

    /// Check if started
    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Database name while started
    pub fn database(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.database.as_str())
    }

    /// Acting user while started
    pub fn user(&self) -> Option<UserId> {
        self.active.as_ref().map(|a| a.user)
    }

    /// Execution context while started
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.active.as_ref().map(|a| &a.context)
    }

    /// Stop disposition while started
    pub fn disposition(&self) -> Option<Disposition> {
        self.active.as_ref().map(|a| a.disposition)
    }

    /// Change what stop will do
    pub fn set_disposition(&mut self, disposition: Disposition) -> ProctorResult<()> {
        let active = self.active.as_mut().ok_or(ProctorError::NotStarted)?;
        active.disposition = disposition;
        Ok(())
    }

    /// The shared cursor
    pub fn cursor(&self) -> ProctorResult<SharedCursor> {
        self.active
            .as_ref()
            .map(|a| Arc::clone(&a.cursor))
            .ok_or(ProctorError::NotStarted)
    }

    /// Connector this context opens connections through
    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop transaction on drop");
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("database", &self.database())
            .field("user", &self.user())
            .field("disposition", &self.disposition())
            .finish()
    }
}

/// Started transaction that stops when dropped
pub struct TransactionScope<'a> {
    txn: &'a mut Transaction,
}

impl TransactionScope<'_> {
    /// Stop now, surfacing any error
    pub fn finish(self) -> ProctorResult<()> {
        // Drop runs afterwards and finds the context stopped
        self.txn.stop()
    }
}

impl Deref for TransactionScope<'_> {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        self.txn
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut Transaction {
        self.txn
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.txn.stop() {
            warn!(error = %e, "failed to stop scoped transaction");
        }
    }
}
