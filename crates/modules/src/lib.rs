//! Module discovery and dependency resolution
//!
//! - literal: descriptor literal parser (no evaluation)
//! - manifest: descriptor reading into [`Module`]
//! - graph: dependency graph builder with cycle detection, plus [`GraphCache`]
//! - order: topological sequencing for install/test order
//! - detect: changed-path to module detection
//! - requirements: requirement file discovery

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod detect;
pub mod graph;
pub mod literal;
pub mod manifest;
pub mod order;
pub mod requirements;

pub use detect::{detect_module, find_files, module_paths, modules_from_paths};
pub use graph::{DependencyGraph, GraphBuilder, GraphCache};
pub use literal::{parse_literal, LiteralError};
pub use manifest::{is_module_dir, read_module, Manifest, Module, MANIFEST_FILE, REQUIREMENTS_FILE};
pub use order::{order, sort_modules_by_dependencies};
pub use requirements::requirement_files;
