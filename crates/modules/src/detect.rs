//! Changed-path to module detection
//!
//! Used to narrow a run to the modules touched by a change: paths are pulled
//! out of a unified diff, then each path is walked upwards until a directory
//! holding a module descriptor is found.

use crate::manifest::is_module_dir;
use proctor_core::ModuleName;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extract the unique file paths named by a unified diff
///
/// Only `--- a/<path>` and `+++ b/<path>` headers count, so `/dev/null`
/// sides of created or deleted files are ignored. Paths keep first-seen
/// order.
pub fn find_files(diff: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for line in diff.lines() {
        let path = line
            .strip_prefix("--- a/")
            .or_else(|| line.strip_prefix("+++ b/"));
        // git appends a tab and timestamp in some modes
        let Some(path) = path.map(|p| p.split('\t').next().unwrap_or(p).trim_end()) else {
            continue;
        };
        if !path.is_empty() && seen.insert(path.to_string()) {
            files.push(path.to_string());
        }
    }
    files
}

/// Find the module owning `path`
///
/// Relative paths are taken relative to `root`; absolute paths outside
/// `root` belong to no module. The walk never climbs above `root` and
/// returns `None` when no enclosing directory carries a descriptor.
pub fn detect_module(path: &Path, root: &Path) -> Option<ModuleName> {
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    if !full.starts_with(root) {
        return None;
    }

    for dir in full.ancestors() {
        if dir.is_dir() && is_module_dir(dir) {
            let name = dir.file_name()?.to_str()?;
            return Some(ModuleName::from(name));
        }
        if dir == root {
            break;
        }
    }
    None
}

/// Map changed paths to their modules, dropping duplicates and non-module paths
pub fn modules_from_paths<P: AsRef<Path>>(paths: &[P], root: &Path) -> Vec<ModuleName> {
    let mut modules: Vec<ModuleName> = Vec::new();
    for path in paths {
        match detect_module(path.as_ref(), root) {
            Some(module) if !modules.contains(&module) => {
                tracing::debug!(path = %path.as_ref().display(), module = %module, "changed path belongs to module");
                modules.push(module);
            }
            Some(_) => {}
            None => {
                tracing::debug!(path = %path.as_ref().display(), "changed path outside any module");
            }
        }
    }
    modules
}

/// Directories of `modules` under `module_root`, for coverage collaborators
pub fn module_paths(modules: &[ModuleName], module_root: &Path) -> Vec<PathBuf> {
    modules
        .iter()
        .map(|m| module_root.join(m.as_str()))
        .filter(|p| p.is_dir())
        .collect()
}
