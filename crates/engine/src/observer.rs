//! Run observers
//!
//! Report sinks (JUnit, coverage, lint) hook into a run through
//! [`RunObserver`]. Observers cannot fail the run; they log their own errors.

use proctor_core::{ModuleName, ModuleOutcome, RunReport, TestStatus};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Callbacks over the course of a run
pub trait RunObserver: Send + Sync {
    /// The run is about to test `modules`, in this order
    fn run_started(&self, modules: &[ModuleName]) {
        let _ = modules;
    }

    /// `module` is about to be processed
    fn module_started(&self, module: &ModuleName) {
        let _ = module;
    }

    /// `outcome` is final
    fn module_finished(&self, outcome: &ModuleOutcome) {
        let _ = outcome;
    }

    /// Every module was processed
    fn run_finished(&self, report: &RunReport) {
        let _ = report;
    }
}

/// Logs progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn run_started(&self, modules: &[ModuleName]) {
        info!(modules = ?modules, "test run started");
    }

    fn module_started(&self, module: &ModuleName) {
        info!(module = %module, "testing module");
    }

    fn module_finished(&self, outcome: &ModuleOutcome) {
        let passed = outcome.count(TestStatus::Passed);
        let failed = outcome.count(TestStatus::Failed);
        let errors = outcome.count(TestStatus::Error);
        let skipped = outcome.count(TestStatus::Skipped);
        if outcome.is_success() {
            info!(
                module = %outcome.module,
                passed,
                skipped,
                elapsed_ms = outcome.duration.as_millis() as u64,
                "module passed"
            );
            return;
        }
        for test in outcome.failures() {
            warn!(
                module = %outcome.module,
                test = %format!("{}.{}", test.classname, test.name),
                status = %test.status,
                message = test.message.as_deref().unwrap_or(""),
                "test did not pass"
            );
        }
        error!(
            module = %outcome.module,
            phase = ?outcome.phase,
            passed,
            failed,
            errors,
            error = outcome.error.as_deref().unwrap_or(""),
            "module failed"
        );
    }

    fn run_finished(&self, report: &RunReport) {
        let failed = report.failed_modules();
        if failed.is_empty() {
            info!(modules = report.modules.len(), "test run succeeded");
        } else {
            error!(failed = ?failed, "test run failed");
        }
    }
}

/// Writes the final report as JSON
#[derive(Debug, Clone)]
pub struct JsonReportObserver {
    path: PathBuf,
}

impl JsonReportObserver {
    /// Observer writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RunObserver for JsonReportObserver {
    fn run_finished(&self, report: &RunReport) {
        let written = serde_json::to_vec_pretty(report)
            .map_err(std::io::Error::from)
            .and_then(|bytes| std::fs::write(&self.path, bytes));
        match written {
            Ok(()) => info!(path = %self.path.display(), "report written"),
            Err(e) => error!(path = %self.path.display(), error = %e, "failed to write report"),
        }
    }
}
