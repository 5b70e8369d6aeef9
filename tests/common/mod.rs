//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub use proctor::{
    Connector, MemoryRuntime, MemoryServer, ModuleName, ModuleOutcome, RunConfig, RunObserver,
    RunReport, StaticContext, Transaction,
};
pub use proctor_engine::RuntimeEvent;
pub use proctor_modules::MANIFEST_FILE;

// ============================================================================
// Module trees
// ============================================================================

/// A module root on disk, removed on drop
pub struct Addons {
    dir: TempDir,
}

impl Addons {
    pub fn new() -> Self {
        Addons {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Add `name` depending on `deps`
    pub fn module(self, name: &str, deps: &[&str]) -> Self {
        let dir = self.dir.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let deps: Vec<String> = deps.iter().map(|d| format!("'{}'", d)).collect();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "{{\n    'name': '{}',\n    'version': '1.0',\n    'depends': [{}],\n}}\n",
                name,
                deps.join(", ")
            ),
        )
        .unwrap();
        self
    }

    /// Add a directory named `name` with no descriptor
    pub fn bare_dir(self, name: &str) -> Self {
        std::fs::create_dir_all(self.dir.path().join(name)).unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Default configuration rooted here
    pub fn config(&self) -> RunConfig {
        RunConfig {
            addons_path: self.path().to_path_buf(),
            ..RunConfig::default()
        }
    }
}

pub fn names(items: &[&str]) -> Vec<ModuleName> {
    items.iter().map(|s| ModuleName::from(*s)).collect()
}

pub fn runtime() -> Arc<MemoryRuntime> {
    Arc::new(MemoryRuntime::new().expect("Failed to create runtime"))
}

/// Transaction over a fresh server holding database `db`
pub fn memory_transaction() -> (MemoryServer, Arc<Connector>, Transaction) {
    let server = MemoryServer::new();
    server.create_database("db").unwrap();
    let connector = Arc::new(Connector::new(Arc::new(server.clone())));
    let txn = Transaction::new(Arc::clone(&connector), Arc::new(StaticContext::default()));
    (server, connector, txn)
}

// ============================================================================
// Observers
// ============================================================================

/// Records observer callbacks as strings
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl RunObserver for Recorder {
    fn run_started(&self, modules: &[ModuleName]) {
        let modules: Vec<&str> = modules.iter().map(|m| m.as_str()).collect();
        self.calls.lock().push(format!("run_started {}", modules.join(",")));
    }

    fn module_started(&self, module: &ModuleName) {
        self.calls.lock().push(format!("module_started {}", module));
    }

    fn module_finished(&self, outcome: &ModuleOutcome) {
        let verdict = if outcome.is_success() { "ok" } else { "failed" };
        self.calls
            .lock()
            .push(format!("module_finished {} {}", outcome.module, verdict));
    }

    fn run_finished(&self, report: &RunReport) {
        self.calls
            .lock()
            .push(format!("run_finished {}", report.exit_code()));
    }
}

/// Databases created during the run, in order
pub fn created_databases(events: &[RuntimeEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::CreateDatabase { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Modules passed to each install call, in order
pub fn installs(events: &[RuntimeEvent]) -> Vec<Vec<String>> {
    events
        .iter()
        .filter_map(|e| match e {
            RuntimeEvent::Install { modules, .. } => {
                Some(modules.iter().map(|m| m.to_string()).collect())
            }
            _ => None,
        })
        .collect()
}
