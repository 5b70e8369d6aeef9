//! Suite execution
//!
//! Each test gets its own transaction on the module's database, started with
//! the run's disposition and stopped after the body returns or panics.
//! Panics are caught and reported as failures.

use crate::runtime::HostRuntime;
use crate::suite::{TestCase, TestEnv, TestFailure, TestSuite};
use proctor_concurrency::{CursorPatch, Disposition, Transaction, TransactionOptions};
use proctor_core::{ModuleName, TestCaseResult, TestStatus};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the cases of a suite against one database
pub struct SuiteRunner<'a> {
    runtime: &'a dyn HostRuntime,
    database: &'a str,
    module: &'a ModuleName,
    disposition: Disposition,
    languages: &'a [String],
}

impl<'a> SuiteRunner<'a> {
    /// Runner for `module` on `database`
    pub fn new(runtime: &'a dyn HostRuntime, database: &'a str, module: &'a ModuleName) -> Self {
        Self {
            runtime,
            database,
            module,
            disposition: Disposition::Rollback,
            languages: &[],
        }
    }

    /// What each test transaction does when it stops
    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Languages exposed to tests
    pub fn languages(mut self, languages: &'a [String]) -> Self {
        self.languages = languages;
        self
    }

    /// Run every case in order
    pub fn run(&self, suite: &TestSuite) -> Vec<TestCaseResult> {
        info!(
            module = %self.module,
            suite = suite.name(),
            tests = suite.len(),
            "running test suite"
        );
        suite
            .cases()
            .iter()
            .map(|case| self.run_case(suite, case))
            .collect()
    }

    fn run_case(&self, suite: &TestSuite, case: &TestCase) -> TestCaseResult {
        let started = Instant::now();
        let mut txn = Transaction::new(self.runtime.connector(), self.runtime.context_resolver());
        let options = TransactionOptions::default().disposition(self.disposition);

        let (outcome, output) = match txn.start_with(self.database, options) {
            Ok(()) => self.call(suite, case, &txn),
            Err(e) => (Err(TestFailure::from(e)), String::new()),
        };
        let outcome = match (outcome, txn.stop()) {
            (Ok(()), Err(e)) => Err(TestFailure::from(e)),
            (outcome, Err(e)) => {
                warn!(test = case.name(), error = %e, "test transaction did not stop cleanly");
                outcome
            }
            (outcome, Ok(())) => outcome,
        };

        let (status, message) = match outcome {
            Ok(()) => (TestStatus::Passed, None),
            Err(TestFailure::Failed(m)) => (TestStatus::Failed, Some(m)),
            Err(TestFailure::Error(m)) => (TestStatus::Error, Some(m)),
            Err(TestFailure::Skipped(m)) => (TestStatus::Skipped, Some(m)),
        };
        let elapsed = started.elapsed();
        debug!(
            module = %self.module,
            test = case.name(),
            status = %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "test finished"
        );
        TestCaseResult {
            name: case.name().to_string(),
            classname: suite.name().to_string(),
            status,
            elapsed,
            output,
            message,
        }
    }

    fn call(
        &self,
        suite: &TestSuite,
        case: &TestCase,
        txn: &Transaction,
    ) -> (Result<(), TestFailure>, String) {
        let patch = if suite.patches(case) {
            match CursorPatch::enable(txn.connector(), txn) {
                Ok(patch) => Some(patch),
                Err(e) => return (Err(e.into()), String::new()),
            }
        } else {
            None
        };

        let mut env = TestEnv::new(txn, self.runtime, self.module, self.languages);
        let result = panic::catch_unwind(AssertUnwindSafe(|| case.call(&mut env)));
        let output = env.into_output();

        let mut outcome = match result {
            Ok(outcome) => outcome,
            Err(payload) => Err(TestFailure::Failed(panic_message(payload.as_ref()))),
        };
        if let Some(mut patch) = patch {
            if let Err(e) = patch.disable() {
                // the test left a patch of its own enabled
                warn!(test = case.name(), error = %e, "cursor patch not restored by test");
                if outcome.is_ok() {
                    outcome = Err(e.into());
                }
            }
        }
        (outcome, output)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_string()
    }
}
