//! Core types for proctor
//!
//! This crate defines the foundational types used throughout the workspace:
//! - ProctorError / ErrorKind: error taxonomy (fatal vs per-module)
//! - Value / Row: cursor parameter and column values
//! - ModuleName, UserId, ExecutionContext: identifiers and environment
//! - TestStatus, TestCaseResult, ModuleOutcome, RunReport: run results
//! - ModulePhase: per-module run state machine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod outcome;
pub mod types;
pub mod value;

pub use error::{ErrorKind, ProctorError, ProctorResult};
pub use outcome::{ModuleOutcome, ModulePhase, RunReport, TestCaseResult, TestStatus};
pub use types::{ExecutionContext, ModuleName, UserId};
pub use value::{Row, Value};
