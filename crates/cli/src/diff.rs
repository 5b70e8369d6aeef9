//! Changed module detection for `--diff` / `--diff-file`.

use std::path::{Path, PathBuf};
use std::process::Command;

use proctor_core::{ModuleName, ProctorError, ProctorResult};
use proctor_modules::{find_files, modules_from_paths};
use tracing::debug;

use crate::parse::DiffSource;

/// Paths touched by the change, relative to the working directory
pub fn changed_paths(source: &DiffSource) -> ProctorResult<Vec<PathBuf>> {
    match source {
        DiffSource::Git(reference) => {
            let range = format!("{}..HEAD", reference);
            let output = Command::new("git")
                .args(["diff", "--relative", "--name-only", &range])
                .output()
                .map_err(|e| ProctorError::invalid_config(format!("failed to run git: {}", e)))?;
            if !output.status.success() {
                return Err(ProctorError::invalid_config(format!(
                    "git diff {} failed: {}",
                    range,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(PathBuf::from)
                .collect())
        }
        DiffSource::File(path) => {
            let diff = std::fs::read_to_string(path).map_err(|e| {
                ProctorError::invalid_config(format!(
                    "failed to read diff '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(find_files(&diff).into_iter().map(PathBuf::from).collect())
        }
    }
}

/// Modules under `addons_path` owning the given paths
///
/// `base` is the directory the paths are relative to.
pub fn modules_for(paths: &[PathBuf], base: &Path, addons_path: &Path) -> Vec<ModuleName> {
    let addons = base.join(addons_path);
    let inside: Vec<PathBuf> = paths
        .iter()
        .map(|p| base.join(p))
        .filter(|p| {
            let keep = p.starts_with(&addons);
            if !keep {
                debug!(path = %p.display(), "changed path outside addons path");
            }
            keep
        })
        .collect();
    modules_from_paths(&inside, &addons)
}

/// Modules touched by `source`
pub fn changed_modules(source: &DiffSource, addons_path: &Path) -> ProctorResult<Vec<ModuleName>> {
    let paths = changed_paths(source)?;
    let cwd = std::env::current_dir()?;
    Ok(modules_for(&paths, &cwd, addons_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_modules::MANIFEST_FILE;
    use tempfile::TempDir;

    #[test]
    fn test_modules_for_diff_file() {
        let dir = TempDir::new().unwrap();
        let sale = dir.path().join("addons").join("sale");
        std::fs::create_dir_all(sale.join("models")).unwrap();
        std::fs::write(sale.join(MANIFEST_FILE), "{'depends': ['base']}").unwrap();
        std::fs::write(sale.join("models").join("order.py"), "").unwrap();

        let diff_path = dir.path().join("change.diff");
        std::fs::write(
            &diff_path,
            "\
--- a/addons/sale/models/order.py
+++ b/addons/sale/models/order.py
@@ -1 +1 @@
--- a/README.md
+++ b/README.md
",
        )
        .unwrap();

        let paths = changed_paths(&DiffSource::File(diff_path)).unwrap();
        assert_eq!(paths.len(), 2);
        let modules = modules_for(&paths, dir.path(), Path::new("addons"));
        assert_eq!(modules, vec![ModuleName::from("sale")]);
    }

    #[test]
    fn test_missing_diff_file_is_configuration_error() {
        let err = changed_paths(&DiffSource::File(PathBuf::from("/nonexistent/x.diff")))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
