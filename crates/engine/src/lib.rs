//! Test run engine for proctor
//!
//! This crate drives a test run against a host runtime:
//! - HostRuntime: the database and module operations a run needs
//! - TestRunCoordinator: ordering, provisioning, installation, reporting
//! - TestSuite / SuiteRunner: test cases, each in its own transaction
//! - RunConfig: `proctor.toml` plus `PROCTOR_*` overrides
//! - RunObserver: report sinks
//! - MemoryRuntime: in-process runtime used by the CLI and the tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod claims;
pub mod config;
pub mod coordinator;
pub mod memory;
pub mod observer;
pub mod runner;
pub mod runtime;
pub mod suite;

pub use claims::DatabaseClaim;
pub use config::{RunConfig, CONFIG_FILE_NAME, ENV_PREFIX};
pub use coordinator::{TestRunCoordinator, WHOLE_RUNTIME};
pub use memory::{MemoryRuntime, RuntimeEvent, UserTableResolver, DEFAULT_TEMPLATE};
pub use observer::{JsonReportObserver, RunObserver, TracingObserver};
pub use runner::SuiteRunner;
pub use runtime::{
    DatabaseSource, HostRuntime, LoggingInstaller, ModuleState, RequirementsInstaller,
};
pub use suite::{
    ensure, installation_suite, SuiteLoader, SuiteRegistry, TestCase, TestEnv, TestFailure,
    TestFilter, TestFn, TestResult, TestSuite, INSTALLATION_SUITE,
};
