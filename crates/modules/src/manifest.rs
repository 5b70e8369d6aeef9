//! Module descriptors
//!
//! Every module directory carries a descriptor file, [`MANIFEST_FILE`],
//! holding one literal dictionary. The module's identifier is the directory
//! name; the descriptor's `name` key is a human label.
//!
//! # Example
//!
//! ```text
//! {
//!     "name": "Sales",
//!     "version": "0-dev",
//!     "depends": ["base", "product"],
//!     "installable": True,
//! }
//! ```

use crate::literal::parse_literal;
use proctor_core::{ModuleName, ProctorError, ProctorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Descriptor file name inside a module directory
pub const MANIFEST_FILE: &str = "__terp__.py";

/// Requirements file name inside a module directory
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

fn default_true() -> bool {
    true
}

/// Declared module metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Human readable label
    #[serde(default)]
    pub name: Option<String>,
    /// Module version string
    #[serde(default)]
    pub version: Option<String>,
    /// Long description
    #[serde(default)]
    pub description: Option<String>,
    /// Author
    #[serde(default)]
    pub author: Option<String>,
    /// Category label
    #[serde(default)]
    pub category: Option<String>,
    /// Direct dependencies, in declaration order
    #[serde(default)]
    pub depends: Vec<ModuleName>,
    /// Whether the module can be installed at all
    #[serde(default = "default_true")]
    pub installable: bool,
    /// Auto-install flag
    #[serde(default)]
    pub active: bool,
    /// Demo data files
    #[serde(default)]
    pub demo_xml: Vec<String>,
    /// Data loaded on install
    #[serde(default)]
    pub init_xml: Vec<String>,
    /// Data loaded on install and update
    #[serde(default)]
    pub update_xml: Vec<String>,
    /// Keys this struct does not model
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    /// Parse a descriptor's text
    ///
    /// `path` is only used for error messages.
    pub fn parse(src: &str, path: &Path) -> ProctorResult<Self> {
        let value = parse_literal(src).map_err(|e| ProctorError::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(ProctorError::ManifestParse {
                path: path.to_path_buf(),
                reason: "descriptor must be a dictionary".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| ProctorError::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// A module resolved on disk
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Identifier (directory name)
    pub name: ModuleName,
    /// Module directory
    pub path: PathBuf,
    /// Parsed descriptor
    pub manifest: Manifest,
}

impl Module {
    /// Direct dependencies in declaration order
    pub fn depends(&self) -> &[ModuleName] {
        &self.manifest.depends
    }

    /// Path of the module's requirements file (may not exist)
    pub fn requirements_path(&self) -> PathBuf {
        self.path.join(REQUIREMENTS_FILE)
    }
}

/// Read the module `name` under `module_root`
///
/// A missing directory is `ModuleNotFound`; a directory without descriptor
/// is `ManifestMissing`. Neither is ever skipped silently.
pub fn read_module(module_root: &Path, name: &ModuleName) -> ProctorResult<Module> {
    let path = module_root.join(name.as_str());
    if !path.is_dir() {
        return Err(ProctorError::ModuleNotFound {
            module: name.to_string(),
            referrer: None,
            root: module_root.to_path_buf(),
        });
    }
    let manifest_path = path.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(ProctorError::ManifestMissing {
            module: name.to_string(),
            path: manifest_path,
        });
    }
    let src = std::fs::read_to_string(&manifest_path)?;
    let manifest = Manifest::parse(&src, &manifest_path)?;
    tracing::debug!(module = %name, depends = ?manifest.depends, "read manifest");
    Ok(Module {
        name: name.clone(),
        path,
        manifest,
    })
}

/// Check whether `dir` is a module directory
pub fn is_module_dir(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}
