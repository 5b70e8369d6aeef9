//! Error types for proctor
//!
//! This module defines the error type shared by every crate in the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors are classified by [`ErrorKind`]. Configuration and usage errors are
//! fatal: they abort a run before (or instead of) touching any database.
//! Provisioning, installation and database errors belong to a single module
//! and are recorded in that module's outcome while the run continues.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for proctor operations
pub type ProctorResult<T> = std::result::Result<T, ProctorError>;

/// Coarse classification of a [`ProctorError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing manifest, cyclic dependency, unknown module, bad config
    Configuration,
    /// Database creation, drop or session termination failed
    Provisioning,
    /// Module or requirement installation failed
    Installation,
    /// API misuse such as starting an already started transaction
    Usage,
    /// Failure reported by a cursor or connection
    Database,
    /// Filesystem or process I/O
    Io,
}

/// Error types for proctor
#[derive(Debug, Error)]
pub enum ProctorError {
    /// A module directory does not exist under the module root
    #[error("Module {module} not found in {}{}", .root.display(), referrer_suffix(.referrer))]
    ModuleNotFound {
        /// Module that was looked up
        module: String,
        /// Module whose manifest referenced it, if any
        referrer: Option<String>,
        /// Module root that was searched
        root: PathBuf,
    },

    /// A module directory exists but carries no descriptor file
    #[error("Module {module} is not a valid module. Missing manifest {}", .path.display())]
    ManifestMissing {
        /// Module name
        module: String,
        /// Expected descriptor path
        path: PathBuf,
    },

    /// The descriptor could not be parsed as a literal structure
    #[error("Invalid manifest {}: {reason}", .path.display())]
    ManifestParse {
        /// Descriptor path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Dependency resolution re-entered a module that was still being visited
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// Modules along the cycle; first and last entries are equal
        cycle: Vec<String>,
    },

    /// A module was requested that the dependency graph does not contain
    #[error("Unknown module: {module}")]
    UnknownModule {
        /// Module name
        module: String,
    },

    /// Configuration file or environment value is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database could not be created, dropped or released
    #[error("Provisioning failed for database {database}: {reason}")]
    Provisioning {
        /// Database name
        database: String,
        /// Failure description
        reason: String,
    },

    /// Module installation failed
    #[error("Installation of module {module} failed: {reason}")]
    Installation {
        /// Module name
        module: String,
        /// Failure description
        reason: String,
    },

    /// Requirement file installation failed
    #[error("Requirements {} could not be installed: {reason}", .path.display())]
    Requirements {
        /// Requirement file
        path: PathBuf,
        /// Failure description
        reason: String,
    },

    /// A transaction is already started on this thread
    #[error("Transaction already started on database {database}")]
    AlreadyStarted {
        /// Database of the active transaction
        database: String,
    },

    /// The operation needs a started transaction
    #[error("Transaction not started")]
    NotStarted,

    /// A stopped transaction still carries state
    #[error("Transaction not stopped: {field} is still set")]
    NotStopped {
        /// First field found non-empty
        field: &'static str,
    },

    /// A patched cursor outlived the transaction it wraps
    #[error("Transaction backing this cursor has been stopped")]
    TransactionStopped,

    /// Cursor interception was disabled out of order or twice
    #[error("Cursor patch mismatch: {0}")]
    PatchMismatch(String),

    /// Module run state machine was driven through an illegal edge
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition {
        /// Current phase
        from: String,
        /// Requested phase
        to: String,
    },

    /// Cursor or connection failure
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error (file operations, subprocesses)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn referrer_suffix(referrer: &Option<String>) -> String {
    match referrer {
        Some(r) => format!(" (required by {})", r),
        None => String::new(),
    }
}

impl ProctorError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        ProctorError::Database(msg.into())
    }

    /// Create a configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ProctorError::InvalidConfig(msg.into())
    }

    /// Create a provisioning error
    pub fn provisioning(database: impl Into<String>, reason: impl Into<String>) -> Self {
        ProctorError::Provisioning {
            database: database.into(),
            reason: reason.into(),
        }
    }

    /// Create an installation error
    pub fn installation(module: impl Into<String>, reason: impl Into<String>) -> Self {
        ProctorError::Installation {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProctorError::ModuleNotFound { .. }
            | ProctorError::ManifestMissing { .. }
            | ProctorError::ManifestParse { .. }
            | ProctorError::DependencyCycle { .. }
            | ProctorError::UnknownModule { .. }
            | ProctorError::InvalidConfig(_) => ErrorKind::Configuration,
            ProctorError::Provisioning { .. } => ErrorKind::Provisioning,
            ProctorError::Installation { .. } | ProctorError::Requirements { .. } => {
                ErrorKind::Installation
            }
            ProctorError::AlreadyStarted { .. }
            | ProctorError::NotStarted
            | ProctorError::NotStopped { .. }
            | ProctorError::TransactionStopped
            | ProctorError::PatchMismatch(_)
            | ProctorError::InvalidPhaseTransition { .. } => ErrorKind::Usage,
            ProctorError::Database(_) => ErrorKind::Database,
            ProctorError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Usage)
    }
}
