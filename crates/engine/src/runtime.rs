//! Host runtime contract
//!
//! The coordinator never manipulates the business-application runtime
//! directly. Everything it needs (database lifecycle, module installation,
//! registry reloads) goes through [`HostRuntime`]. Requirement files are
//! handed to a [`RequirementsInstaller`]; how they are installed is up to
//! the implementation.

use proctor_concurrency::{ContextResolver, Connector, Transaction};
use proctor_core::{ModuleName, ProctorResult};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// How a new database is populated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSource {
    /// Copy of an existing template database
    Template(String),
    /// Full base installation
    Scratch {
        /// Load demo data
        demo: bool,
    },
}

impl fmt::Display for DatabaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseSource::Template(t) => write!(f, "template {}", t),
            DatabaseSource::Scratch { demo: true } => f.write_str("scratch with demo data"),
            DatabaseSource::Scratch { demo: false } => f.write_str("scratch"),
        }
    }
}

/// Installation state of a module in a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Known to the database, not installed
    Uninstalled,
    /// Scheduled for installation
    ToInstall,
    /// Installed
    Installed,
    /// Not known to the database
    Unknown,
}

impl ModuleState {
    /// Parse the state strings used in module tables
    pub fn parse(s: &str) -> Self {
        match s {
            "uninstalled" => ModuleState::Uninstalled,
            "to install" => ModuleState::ToInstall,
            "installed" => ModuleState::Installed,
            _ => ModuleState::Unknown,
        }
    }

    /// State string as stored in module tables
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::ToInstall => "to install",
            ModuleState::Installed => "installed",
            ModuleState::Unknown => "unknown",
        }
    }
}

/// Operations the coordinator needs from the application runtime
pub trait HostRuntime: Send + Sync {
    /// Connector every connection of the runtime goes through
    fn connector(&self) -> Arc<Connector>;

    /// Resolver for transaction contexts
    fn context_resolver(&self) -> Arc<dyn ContextResolver>;

    /// Create database `name`
    fn create_database(&self, name: &str, source: &DatabaseSource) -> ProctorResult<()>;

    /// Drop database `name`; sessions must have been terminated
    fn drop_database(&self, name: &str) -> ProctorResult<()>;

    /// Forcibly end every session on `name`
    fn terminate_sessions(&self, name: &str) -> ProctorResult<usize>;

    /// Check if database `name` exists
    fn database_exists(&self, name: &str) -> bool;

    /// Installation state of `module` in `database`
    fn module_state(&self, database: &str, module: &str) -> ProctorResult<ModuleState>;

    /// Install `modules` (dependency order) inside `txn`
    ///
    /// The caller commits by stopping the transaction.
    fn install_modules(&self, txn: &Transaction, modules: &[ModuleName]) -> ProctorResult<()>;

    /// Rebuild the runtime's model registry for `database` after installs
    fn reload_registry(&self, database: &str) -> ProctorResult<()>;

    /// Keep background jobs from running against `database`
    fn disable_scheduler(&self, database: &str) -> ProctorResult<()> {
        let _ = database;
        Ok(())
    }
}

/// Installs a module's requirement file
pub trait RequirementsInstaller: Send + Sync {
    /// Install the requirements listed in `path`
    fn install(&self, module: &ModuleName, path: &Path) -> ProctorResult<()>;
}

/// Installer that only reports what would be installed
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInstaller;

impl RequirementsInstaller for LoggingInstaller {
    fn install(&self, module: &ModuleName, path: &Path) -> ProctorResult<()> {
        tracing::info!(module = %module, path = %path.display(), "requirements file found");
        Ok(())
    }
}
