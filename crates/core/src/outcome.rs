//! Test outcomes and the per-module run state machine
//!
//! A [`ModuleOutcome`] is produced for every module the coordinator
//! processes, whether its tests ran or it failed earlier. [`RunReport`]
//! aggregates them; it is serializable so report sinks can render
//! machine-readable output per module.
//!
//! ## Phase transitions
//!
//! ```text
//! Pending → RequirementsInstalled → DatabaseReady → ModuleInstalled
//!         → TestsRunning → {Passed, Failed, Errored} → Reported
//! ```
//!
//! Any non-terminal phase may jump to `Errored`.

use crate::error::{ProctorError, ProctorResult};
use crate::types::ModuleName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Status of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test completed without failure
    Passed,
    /// An assertion did not hold
    Failed,
    /// The test raised an unexpected error
    Error,
    /// The test chose not to run
    Skipped,
}

impl TestStatus {
    /// Whether this status counts against the module
    pub fn is_failure(self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Error => "error",
            TestStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Result of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Test name
    pub name: String,
    /// Owning suite, usually the module name
    pub classname: String,
    /// Final status
    pub status: TestStatus,
    /// Wall time spent in the test
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Output captured through the test environment
    #[serde(default)]
    pub output: String,
    /// Failure, error or skip text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Phase of a module run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModulePhase {
    /// Not started
    Pending,
    /// Requirement files of the module and its dependencies handled
    RequirementsInstalled,
    /// Database provisioned or reused
    DatabaseReady,
    /// Module and unmet dependencies installed
    ModuleInstalled,
    /// Suite executing
    TestsRunning,
    /// Every test passed or was skipped
    Passed,
    /// At least one test failed or errored
    Failed,
    /// The run aborted before or after tests
    Errored,
    /// Outcome delivered to report sinks
    Reported,
}

impl ModulePhase {
    /// Check if the phase ends the run proper
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ModulePhase::Passed | ModulePhase::Failed | ModulePhase::Errored
        )
    }

    /// Check whether `self → next` is a legal transition
    pub fn can_advance_to(self, next: ModulePhase) -> bool {
        use ModulePhase::*;
        match (self, next) {
            (Pending, RequirementsInstalled)
            | (RequirementsInstalled, DatabaseReady)
            | (DatabaseReady, ModuleInstalled)
            | (ModuleInstalled, TestsRunning)
            | (TestsRunning, Passed)
            | (TestsRunning, Failed)
            | (Passed, Reported)
            | (Failed, Reported)
            | (Errored, Reported) => true,
            // Teardown failures may still turn a finished run into an error
            (Passed, Errored) | (Failed, Errored) => true,
            (from, Errored) => !from.is_terminal() && from != Reported,
            _ => false,
        }
    }

    /// Move to `next`, failing on an illegal edge
    pub fn advance(&mut self, next: ModulePhase) -> ProctorResult<()> {
        if !self.can_advance_to(next) {
            return Err(ProctorError::InvalidPhaseTransition {
                from: format!("{:?}", self),
                to: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

/// Outcome of one module (or of the whole-runtime suite)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOutcome {
    /// Module under test
    pub module: ModuleName,
    /// Last phase reached before reporting
    pub phase: ModulePhase,
    /// Database the module ran against, when one was provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Wall time for the whole module run
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Per-test results
    pub tests: Vec<TestCaseResult>,
    /// Error that aborted the run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleOutcome {
    /// Create an outcome in the pending phase
    pub fn new(module: ModuleName) -> Self {
        Self {
            module,
            phase: ModulePhase::Pending,
            database: None,
            duration: Duration::ZERO,
            tests: Vec::new(),
            error: None,
        }
    }

    /// Whether the module succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.tests.iter().any(|t| t.status.is_failure())
    }

    /// Count tests with the given status
    pub fn count(&self, status: TestStatus) -> usize {
        self.tests.iter().filter(|t| t.status == status).count()
    }

    /// Tests that failed or errored
    pub fn failures(&self) -> impl Iterator<Item = &TestCaseResult> {
        self.tests.iter().filter(|t| t.status.is_failure())
    }
}

/// Aggregated result of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Suite not tied to any module, run once before the module loop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whole_runtime: Option<ModuleOutcome>,
    /// Per-module outcomes in execution order
    pub modules: Vec<ModuleOutcome>,
}

impl RunReport {
    /// Iterate every outcome, whole-runtime first
    pub fn outcomes(&self) -> impl Iterator<Item = &ModuleOutcome> {
        self.whole_runtime.iter().chain(self.modules.iter())
    }

    /// Run succeeded iff every outcome succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes().all(ModuleOutcome::is_success)
    }

    /// Process exit code: 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Find the outcome of a module
    pub fn module(&self, name: &str) -> Option<&ModuleOutcome> {
        self.modules.iter().find(|m| m.module == name)
    }

    /// Names of modules that did not succeed
    pub fn failed_modules(&self) -> Vec<&ModuleName> {
        self.outcomes()
            .filter(|m| !m.is_success())
            .map(|m| &m.module)
            .collect()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
