//! Test suites
//!
//! A [`TestSuite`] is a named list of [`TestCase`]s. Each case is a closure
//! receiving a [`TestEnv`]: the started transaction for the test, the host
//! runtime and an output buffer. Returning `Err(TestFailure::Failed)` or
//! panicking fails the test; `Err(TestFailure::Error)` (including any
//! propagated `ProctorError`) marks it as errored.
//!
//! Suites are found through a [`SuiteLoader`]. Modules without a suite get
//! [`installation_suite`], which only checks that the module installed.

use crate::runtime::{HostRuntime, ModuleState};
use proctor_concurrency::{with_patched_cursors, Connection, SharedCursor, Transaction};
use proctor_core::{ExecutionContext, ModuleName, ProctorError, ProctorResult, UserId};
use proctor_modules::Module;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a test did not pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestFailure {
    /// An expectation did not hold
    #[error("{0}")]
    Failed(String),
    /// The test hit an unexpected error
    #[error("{0}")]
    Error(String),
    /// The test decided not to run
    #[error("skipped: {0}")]
    Skipped(String),
}

impl TestFailure {
    /// Failed expectation
    pub fn failed(msg: impl Into<String>) -> Self {
        TestFailure::Failed(msg.into())
    }

    /// Skip with a reason
    pub fn skipped(reason: impl Into<String>) -> Self {
        TestFailure::Skipped(reason.into())
    }
}

impl From<ProctorError> for TestFailure {
    fn from(e: ProctorError) -> Self {
        TestFailure::Error(e.to_string())
    }
}

/// Result of a test body
pub type TestResult = Result<(), TestFailure>;

/// Fail with `msg` unless `cond` holds
pub fn ensure(cond: bool, msg: impl Into<String>) -> TestResult {
    if cond {
        Ok(())
    } else {
        Err(TestFailure::Failed(msg.into()))
    }
}

/// Test body
pub type TestFn = Arc<dyn Fn(&mut TestEnv<'_>) -> TestResult + Send + Sync>;

/// One named test
#[derive(Clone)]
pub struct TestCase {
    name: String,
    func: TestFn,
    patched: bool,
}

impl TestCase {
    /// Create a test case
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut TestEnv<'_>) -> TestResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            patched: false,
        }
    }

    /// Run this test with cursors patched onto its transaction
    pub fn patched(mut self) -> Self {
        self.patched = true;
        self
    }

    /// Test name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether cursors are patched for this test
    pub fn is_patched(&self) -> bool {
        self.patched
    }

    pub(crate) fn call(&self, env: &mut TestEnv<'_>) -> TestResult {
        (self.func)(env)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("patched", &self.patched)
            .finish()
    }
}

/// Named collection of test cases
#[derive(Debug, Clone)]
pub struct TestSuite {
    name: String,
    cases: Vec<TestCase>,
    require_demo_data: bool,
    all_patched_cursors: bool,
}

impl TestSuite {
    /// Create an empty suite; `name` is reported as the class name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            require_demo_data: false,
            all_patched_cursors: false,
        }
    }

    /// Add a test
    pub fn case<F>(self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut TestEnv<'_>) -> TestResult + Send + Sync + 'static,
    {
        self.with_case(TestCase::new(name, func))
    }

    /// Add a prepared test case
    pub fn with_case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    /// Require a database with demo data
    pub fn require_demo_data(mut self) -> Self {
        self.require_demo_data = true;
        self
    }

    /// Patch cursors for every test in the suite
    pub fn all_patched_cursors(mut self) -> Self {
        self.all_patched_cursors = true;
        self
    }

    /// Suite name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Test cases in declaration order
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Number of test cases
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Check if the suite has no tests
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Whether the suite needs demo data
    pub fn requires_demo_data(&self) -> bool {
        self.require_demo_data
    }

    /// Whether `case` runs with patched cursors
    pub fn patches(&self, case: &TestCase) -> bool {
        self.all_patched_cursors || case.patched
    }

    /// Copy keeping only the tests `filter` selects
    pub fn filtered(&self, filter: &TestFilter) -> TestSuite {
        TestSuite {
            name: self.name.clone(),
            cases: self
                .cases
                .iter()
                .filter(|c| filter.matches(&self.name, &c.name))
                .cloned()
                .collect(),
            require_demo_data: self.require_demo_data,
            all_patched_cursors: self.all_patched_cursors,
        }
    }
}

/// Selects tests by name
///
/// A pattern matches a test named `name` in suite `Suite` when it is
/// `name`, `Suite.name`, or `Suite` (the whole suite). No patterns means
/// every test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFilter {
    patterns: Vec<String>,
}

impl TestFilter {
    /// Filter from patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if every test is selected
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Check if the test `name` of `suite` is selected
    pub fn matches(&self, suite: &str, name: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns.iter().any(|p| match p.split_once('.') {
            Some((class, test)) => class == suite && test == name,
            None => p == name || p == suite,
        })
    }
}

/// Finds the suites to run
pub trait SuiteLoader: Send + Sync {
    /// Suite of `module`, or `None` if it ships none
    fn load(&self, module: &Module) -> ProctorResult<Option<TestSuite>>;

    /// Suite not tied to any module, run once per run
    fn load_runtime(&self) -> ProctorResult<Option<TestSuite>> {
        Ok(None)
    }
}

/// Suites registered in code
#[derive(Debug, Clone, Default)]
pub struct SuiteRegistry {
    suites: BTreeMap<ModuleName, TestSuite>,
    runtime: Option<TestSuite>,
}

impl SuiteRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `suite` for `module`
    pub fn register(mut self, module: impl Into<ModuleName>, suite: TestSuite) -> Self {
        self.suites.insert(module.into(), suite);
        self
    }

    /// Register the whole-runtime suite
    pub fn runtime(mut self, suite: TestSuite) -> Self {
        self.runtime = Some(suite);
        self
    }
}

impl SuiteLoader for SuiteRegistry {
    fn load(&self, module: &Module) -> ProctorResult<Option<TestSuite>> {
        Ok(self.suites.get(&module.name).cloned())
    }

    fn load_runtime(&self) -> ProctorResult<Option<TestSuite>> {
        Ok(self.runtime.clone())
    }
}

/// Name of the fallback suite
pub const INSTALLATION_SUITE: &str = "installation";

/// Fallback suite: the module under test must be installed
pub fn installation_suite() -> TestSuite {
    TestSuite::new(INSTALLATION_SUITE).case("test_module_installed", |env| {
        let state = env.runtime().module_state(env.database(), env.module())?;
        env.log(format!("{} is {}", env.module(), state.as_str()));
        ensure(
            state == ModuleState::Installed,
            format!("module {} is {}", env.module(), state.as_str()),
        )
    })
}

/// What a test body sees
pub struct TestEnv<'a> {
    txn: &'a Transaction,
    runtime: &'a dyn HostRuntime,
    module: &'a ModuleName,
    languages: &'a [String],
    output: String,
}

impl<'a> TestEnv<'a> {
    pub(crate) fn new(
        txn: &'a Transaction,
        runtime: &'a dyn HostRuntime,
        module: &'a ModuleName,
        languages: &'a [String],
    ) -> Self {
        Self {
            txn,
            runtime,
            module,
            languages,
            output: String::new(),
        }
    }

    /// Database of the test transaction
    pub fn database(&self) -> &str {
        self.txn.database().unwrap_or_default()
    }

    /// Acting user
    pub fn user(&self) -> UserId {
        self.txn.user().unwrap_or_default()
    }

    /// Execution context of the transaction
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.txn.context()
    }

    /// The transaction's shared cursor
    pub fn cursor(&self) -> ProctorResult<SharedCursor> {
        self.txn.cursor()
    }

    /// Open a connection the way application code does
    ///
    /// With patched cursors this lands on the transaction's cursor.
    pub fn connect(&self) -> ProctorResult<Box<dyn Connection>> {
        self.txn.connector().connect(self.database())
    }

    /// Run `f` with cursors patched onto the test transaction
    pub fn with_patched_cursors<R>(&self, f: impl FnOnce() -> R) -> ProctorResult<R> {
        with_patched_cursors(self.txn.connector(), self.txn, f)
    }

    /// The test transaction
    pub fn transaction(&self) -> &Transaction {
        self.txn
    }

    /// Host runtime
    pub fn runtime(&self) -> &dyn HostRuntime {
        self.runtime
    }

    /// Module under test
    pub fn module(&self) -> &ModuleName {
        self.module
    }

    /// Languages configured for translation checks
    pub fn languages(&self) -> &[String] {
        self.languages
    }

    /// Append a line to the test's captured output
    pub fn log(&mut self, line: impl AsRef<str>) {
        self.output.push_str(line.as_ref());
        self.output.push('\n');
    }

    pub(crate) fn into_output(self) -> String {
        self.output
    }
}
