//! Requirement file discovery

use crate::graph::DependencyGraph;
use proctor_core::{ProctorError, ProctorResult};
use std::path::PathBuf;

/// Existing requirement files of `module` and every module it depends on
///
/// Dependencies come first, in name order, followed by the module itself.
/// Modules without a requirements file are skipped.
pub fn requirement_files(graph: &DependencyGraph, module: &str) -> ProctorResult<Vec<PathBuf>> {
    let deps = graph
        .transitive_dependencies(module)
        .ok_or_else(|| ProctorError::UnknownModule {
            module: module.to_string(),
        })?;

    let mut files = Vec::new();
    for name in deps.iter().map(|d| d.as_str()).chain(std::iter::once(module)) {
        if let Some(m) = graph.module(name) {
            let path = m.requirements_path();
            if path.is_file() {
                tracing::debug!(module = %name, path = %path.display(), "found requirements file");
                files.push(path);
            }
        }
    }
    Ok(files)
}
