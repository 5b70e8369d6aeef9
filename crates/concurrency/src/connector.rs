//! Pluggable connection factory
//!
//! The [`Connector`] is the single point through which connections are
//! opened. It holds the real (base) factory plus a stack of overriding
//! factories; the innermost override wins. Each override is identified by the
//! [`OverrideToken`] returned when it was pushed, and only the innermost one
//! may be popped.

use crate::cursor::{Connection, ConnectionFactory};
use crate::hooks::{ExecuteHooks, ObservedConnection};
use parking_lot::RwLock;
use proctor_core::{ProctorError, ProctorResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies one pushed override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverrideToken(u64);

impl fmt::Display for OverrideToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "override#{}", self.0)
    }
}

/// Connection factory with an override stack and execute hooks
pub struct Connector {
    base: Arc<dyn ConnectionFactory>,
    overrides: RwLock<Vec<(OverrideToken, Arc<dyn ConnectionFactory>)>>,
    next_token: AtomicU64,
    hooks: Arc<ExecuteHooks>,
}

impl Connector {
    /// Create a connector over the real factory
    pub fn new(base: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            base,
            overrides: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
            hooks: Arc::new(ExecuteHooks::new()),
        }
    }

    /// Execute observers shared by every connection handed out
    pub fn hooks(&self) -> &Arc<ExecuteHooks> {
        &self.hooks
    }

    /// Open a connection through the innermost override, or the base factory
    ///
    /// Only base connections are wrapped in the execute hooks. Override
    /// connections are returned as-is: a cursor patch routes them to the
    /// transaction cursor, which is observed already.
    pub fn connect(&self, database: &str) -> ProctorResult<Box<dyn Connection>> {
        let overridden = self.overrides.read().last().map(|(_, f)| Arc::clone(f));
        match overridden {
            Some(factory) => factory.connect(database),
            None => self.observe(self.base.connect(database)?),
        }
    }

    /// Open a connection through the base factory, ignoring overrides
    pub fn connect_direct(&self, database: &str) -> ProctorResult<Box<dyn Connection>> {
        self.observe(self.base.connect(database)?)
    }

    /// Install `factory` as the innermost override
    pub fn push_override(&self, factory: Arc<dyn ConnectionFactory>) -> OverrideToken {
        let token = OverrideToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let mut overrides = self.overrides.write();
        overrides.push((token, factory));
        tracing::debug!(%token, depth = overrides.len(), "connection override installed");
        token
    }

    /// Remove the innermost override, which must be `token`
    ///
    /// # Errors
    ///
    /// `PatchMismatch` if `token` is not installed or not innermost; the
    /// stack is left untouched in that case.
    pub fn pop_override(&self, token: OverrideToken) -> ProctorResult<()> {
        let mut overrides = self.overrides.write();
        match overrides.last() {
            Some((top, _)) if *top == token => {
                overrides.pop();
                tracing::debug!(%token, depth = overrides.len(), "connection override removed");
                Ok(())
            }
            _ if overrides.iter().any(|(t, _)| *t == token) => Err(ProctorError::PatchMismatch(
                format!("{} is not the innermost override", token),
            )),
            _ => Err(ProctorError::PatchMismatch(format!(
                "{} is not installed",
                token
            ))),
        }
    }

    /// Remove `token` wherever it sits in the stack
    ///
    /// Returns false if it was not installed.
    pub fn remove_override(&self, token: OverrideToken) -> bool {
        let mut overrides = self.overrides.write();
        let before = overrides.len();
        overrides.retain(|(t, _)| *t != token);
        overrides.len() != before
    }

    /// Number of installed overrides
    pub fn depth(&self) -> usize {
        self.overrides.read().len()
    }

    fn observe(&self, conn: Box<dyn Connection>) -> ProctorResult<Box<dyn Connection>> {
        Ok(Box::new(ObservedConnection::new(conn, Arc::clone(&self.hooks))))
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("depth", &self.depth())
            .field("observers", &self.hooks.len())
            .finish()
    }
}
