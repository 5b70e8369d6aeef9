//! Test run coordinator
//!
//! Drives a run end to end:
//!
//! 1. Resolve and sequence the requested modules. Any configuration error
//!    (missing module or descriptor, cycle) aborts here, before a database
//!    is touched.
//! 2. Run the whole-runtime suite, if the loader has one, on its own
//!    database.
//! 3. For every module, in order: hand requirement files to the installer,
//!    provision a database, install the module and its unmet dependencies,
//!    run its suite, then drop the database if the run created it.
//!
//! A failure inside one module ends that module as `Errored` and the run
//! moves on. Tests commit when their database outlives the run and roll
//! back otherwise.

mod database;

use crate::config::RunConfig;
use crate::observer::RunObserver;
use crate::runner::SuiteRunner;
use crate::runtime::{HostRuntime, LoggingInstaller, ModuleState, RequirementsInstaller};
use crate::suite::{installation_suite, SuiteLoader, SuiteRegistry, TestFilter, TestSuite};
use proctor_concurrency::{Disposition, Transaction, TransactionOptions};
use proctor_core::{ModuleName, ModuleOutcome, ModulePhase, ProctorError, ProctorResult, RunReport};
use proctor_modules::{module_paths, order, requirement_files, DependencyGraph, GraphCache, Module};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Name reported for the whole-runtime suite
pub const WHOLE_RUNTIME: &str = "__runtime__";

/// Orchestrates module test runs against a host runtime
pub struct TestRunCoordinator {
    runtime: Arc<dyn HostRuntime>,
    config: RunConfig,
    loader: Arc<dyn SuiteLoader>,
    installer: Arc<dyn RequirementsInstaller>,
    observers: Vec<Arc<dyn RunObserver>>,
    filter: TestFilter,
    cache: GraphCache,
}

impl TestRunCoordinator {
    /// Coordinator with no suites, a logging installer and no observers
    pub fn new(runtime: Arc<dyn HostRuntime>, config: RunConfig) -> Self {
        Self {
            runtime,
            config,
            loader: Arc::new(SuiteRegistry::new()),
            installer: Arc::new(LoggingInstaller),
            observers: Vec::new(),
            filter: TestFilter::default(),
            cache: GraphCache::new(),
        }
    }

    /// Use `loader` to find suites
    pub fn with_loader(mut self, loader: Arc<dyn SuiteLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Use `installer` for requirement files
    pub fn with_installer(mut self, installer: Arc<dyn RequirementsInstaller>) -> Self {
        self.installer = installer;
        self
    }

    /// Add a report sink
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Only run tests selected by `filter`
    pub fn with_filter(mut self, filter: TestFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Dependency graph of `modules` (memoized)
    pub fn graph(&self, modules: &[ModuleName]) -> ProctorResult<Arc<DependencyGraph>> {
        self.cache.resolve(&self.config.addons_path, modules)
    }

    /// Modules the run would test, in order
    ///
    /// # Errors
    ///
    /// Configuration errors only; nothing is provisioned.
    pub fn plan(&self, modules: &[ModuleName]) -> ProctorResult<Vec<ModuleName>> {
        self.config.validate()?;
        let graph = self.graph(modules)?;
        let sequence = order(&graph, modules)?;
        if self.config.test_dependencies {
            return Ok(sequence);
        }
        Ok(sequence
            .into_iter()
            .filter(|m| modules.contains(m))
            .collect())
    }

    /// Directories of `modules`, for coverage collaborators
    pub fn module_paths(&self, modules: &[ModuleName]) -> Vec<PathBuf> {
        module_paths(modules, &self.config.addons_path)
    }

    /// Test `modules`
    ///
    /// Returns `Err` only for configuration errors raised before the first
    /// database operation. Per-module failures are in the report.
    pub fn run(&self, modules: &[ModuleName]) -> ProctorResult<RunReport> {
        let plan = self.plan(modules)?;
        let graph = self.graph(modules)?;
        info!(modules = ?plan, addons_path = %self.config.addons_path.display(), "starting test run");
        self.notify(|o| o.run_started(&plan));

        let mut report = RunReport::default();
        match self.loader.load_runtime() {
            Ok(Some(suite)) => report.whole_runtime = Some(self.run_whole_runtime(Ok(suite))),
            Ok(None) => {}
            Err(e) => report.whole_runtime = Some(self.run_whole_runtime(Err(e))),
        }
        for module in &plan {
            report.modules.push(self.run_module(&graph, module));
        }

        self.notify(|o| o.run_finished(&report));
        Ok(report)
    }

    fn notify(&self, f: impl Fn(&dyn RunObserver)) {
        for observer in &self.observers {
            f(observer.as_ref());
        }
    }

    fn run_whole_runtime(&self, suite: ProctorResult<TestSuite>) -> ModuleOutcome {
        let name = ModuleName::from(WHOLE_RUNTIME);
        self.notify(|o| o.module_started(&name));
        let started = Instant::now();
        let mut outcome = ModuleOutcome::new(name);
        let result = suite.and_then(|suite| self.drive_runtime(&suite, &mut outcome));
        self.finish(outcome, started, result)
    }

    fn run_module(&self, graph: &DependencyGraph, name: &ModuleName) -> ModuleOutcome {
        self.notify(|o| o.module_started(name));
        let started = Instant::now();
        let mut outcome = ModuleOutcome::new(name.clone());
        let result = self.drive_module(graph, name, &mut outcome);
        self.finish(outcome, started, result)
    }

    fn finish(
        &self,
        mut outcome: ModuleOutcome,
        started: Instant,
        result: ProctorResult<()>,
    ) -> ModuleOutcome {
        if let Err(e) = result {
            error!(module = %outcome.module, phase = ?outcome.phase, error = %e, "module run aborted");
            if outcome.phase != ModulePhase::Errored {
                if let Err(pe) = outcome.phase.advance(ModulePhase::Errored) {
                    warn!(module = %outcome.module, error = %pe, "could not mark module errored");
                    outcome.phase = ModulePhase::Errored;
                }
            }
            outcome.error = Some(e.to_string());
        }
        outcome.duration = started.elapsed();
        if let Err(e) = outcome.phase.advance(ModulePhase::Reported) {
            warn!(module = %outcome.module, error = %e, "module outcome reported from unexpected phase");
        }
        self.notify(|o| o.module_finished(&outcome));
        outcome
    }

    fn drive_runtime(&self, suite: &TestSuite, outcome: &mut ModuleOutcome) -> ProctorResult<()> {
        outcome.phase.advance(ModulePhase::RequirementsInstalled)?;
        let name = outcome.module.clone();
        self.with_database(suite.requires_demo_data(), outcome, |database, disposition, outcome| {
            outcome.phase.advance(ModulePhase::ModuleInstalled)?;
            self.run_tests(database, &name, suite, disposition, outcome)
        })
    }

    fn drive_module(
        &self,
        graph: &DependencyGraph,
        name: &ModuleName,
        outcome: &mut ModuleOutcome,
    ) -> ProctorResult<()> {
        let module = graph.module(name).ok_or_else(|| ProctorError::UnknownModule {
            module: name.to_string(),
        })?;

        for path in requirement_files(graph, name)? {
            self.installer
                .install(name, &path)
                .map_err(|e| ProctorError::Requirements {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
        }
        outcome.phase.advance(ModulePhase::RequirementsInstalled)?;

        let suite = self.suite_for(module)?;
        self.with_database(suite.requires_demo_data(), outcome, |database, disposition, outcome| {
            self.install_module(graph, database, name)?;
            outcome.phase.advance(ModulePhase::ModuleInstalled)?;
            self.run_tests(database, name, &suite, disposition, outcome)
        })
    }

    /// Suite for `module` after filtering, or the installation check
    fn suite_for(&self, module: &Module) -> ProctorResult<TestSuite> {
        let suite = self
            .loader
            .load(module)?
            .map(|suite| suite.filtered(&self.filter));
        match suite {
            Some(suite) if !suite.is_empty() => Ok(suite),
            _ => {
                debug!(module = %module.name, "no tests selected, running installation check");
                Ok(installation_suite())
            }
        }
    }

    /// Install `name` and its unmet dependencies in one committed transaction
    fn install_module(
        &self,
        graph: &DependencyGraph,
        database: &str,
        name: &ModuleName,
    ) -> ProctorResult<()> {
        if self.runtime.module_state(database, name)? == ModuleState::Installed {
            debug!(module = %name, database = %database, "module already installed");
            return Ok(());
        }

        let mut pending = Vec::new();
        for module in order(graph, std::slice::from_ref(name))? {
            if self.runtime.module_state(database, &module)? != ModuleState::Installed {
                pending.push(module);
            }
        }

        let as_installation = |e: ProctorError| match e {
            ProctorError::Installation { .. } => e,
            other => ProctorError::installation(name.as_str(), other.to_string()),
        };
        let mut txn = Transaction::new(self.runtime.connector(), self.runtime.context_resolver());
        txn.start_with(
            database,
            TransactionOptions::default().disposition(Disposition::Commit),
        )
        .map_err(as_installation)?;

        if let Err(e) = self.runtime.install_modules(&txn, &pending) {
            txn.set_disposition(Disposition::Rollback)?;
            if let Err(stop) = txn.stop() {
                warn!(module = %name, error = %stop, "failed to roll back installation");
            }
            return Err(as_installation(e));
        }
        txn.stop().map_err(as_installation)?;
        self.runtime.reload_registry(database).map_err(as_installation)?;
        info!(module = %name, database = %database, installed = ?pending, "module installed");
        Ok(())
    }

    fn run_tests(
        &self,
        database: &str,
        name: &ModuleName,
        suite: &TestSuite,
        disposition: Disposition,
        outcome: &mut ModuleOutcome,
    ) -> ProctorResult<()> {
        outcome.phase.advance(ModulePhase::TestsRunning)?;
        let results = SuiteRunner::new(self.runtime.as_ref(), database, name)
            .disposition(disposition)
            .languages(&self.config.languages)
            .run(suite);
        let failed = results.iter().any(|r| r.status.is_failure());
        outcome.tests = results;
        outcome.phase.advance(if failed {
            ModulePhase::Failed
        } else {
            ModulePhase::Passed
        })
    }
}
