//! Proctor - dependency-ordered, transaction-isolated module testing
//!
//! Proctor tests the modules of a modular business runtime. Given a set of
//! modules it resolves their dependency graph from on-disk manifests, tests
//! them in dependency order, gives every module a fresh database and every
//! test its own transaction, and aggregates a single pass/fail verdict.
//!
//! # Quick Start
//!
//! ```ignore
//! use proctor::{MemoryRuntime, RunConfig, TestRunCoordinator};
//! use std::sync::Arc;
//!
//! let config = RunConfig { addons_path: "addons".into(), ..RunConfig::default() };
//! let runtime = Arc::new(MemoryRuntime::new()?);
//! let report = TestRunCoordinator::new(runtime, config).run(&["sale".into()])?;
//! std::process::exit(report.exit_code());
//! ```
//!
//! # Architecture
//!
//! - `proctor-core`: errors, values, run outcomes
//! - `proctor-modules`: manifests, dependency graph, ordering, change detection
//! - `proctor-concurrency`: per-thread transactions, connector, patched cursors
//! - `proctor-engine`: host runtime seam, suites, coordinator, configuration

pub use proctor_core::*;

pub use proctor_concurrency::{
    with_patched_cursors, Connection, ConnectionFactory, Connector, ContextResolver, Cursor,
    CursorPatch, Disposition, ExecuteHooks, ExecuteObserver, MemoryServer, SharedCursor,
    StaticContext, Transaction, TransactionOptions, TransactionScope,
};
pub use proctor_engine::{
    ensure, installation_suite, DatabaseSource, HostRuntime, JsonReportObserver, MemoryRuntime,
    ModuleState, RequirementsInstaller, RunConfig, RunObserver, SuiteLoader, SuiteRegistry,
    TestCase, TestEnv, TestFailure, TestFilter, TestResult, TestRunCoordinator, TestSuite,
    TracingObserver,
};
pub use proctor_modules::{
    detect_module, find_files, modules_from_paths, order, requirement_files,
    sort_modules_by_dependencies, DependencyGraph, GraphBuilder, GraphCache, Manifest, Module,
};
