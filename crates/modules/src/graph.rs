//! Dependency graph resolution
//!
//! [`GraphBuilder`] expands a set of root modules depth-first, reading each
//! module's descriptor once and recording its direct dependencies. Nodes are
//! colour-marked (`Visiting` while their dependencies are being expanded,
//! `Done` afterwards); re-entering a `Visiting` node is the only cycle signal.
//!
//! The resulting [`DependencyGraph`] is immutable. [`GraphCache`] memoizes
//! graphs per (module root, root set) and parsed modules per directory so
//! one run never reads the same descriptor twice.

use crate::manifest::{read_module, Module};
use parking_lot::Mutex;
use proctor_core::{ModuleName, ProctorError, ProctorResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Resolved, acyclic module dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    module_root: PathBuf,
    roots: Vec<ModuleName>,
    modules: BTreeMap<ModuleName, Arc<Module>>,
    transitive: BTreeMap<ModuleName, BTreeSet<ModuleName>>,
}

impl DependencyGraph {
    /// Directory the modules were resolved under
    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    /// Root modules, in the order given to the builder
    pub fn roots(&self) -> &[ModuleName] {
        &self.roots
    }

    /// Number of modules in the graph
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if the graph has no modules
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Check if a module is part of the graph
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Look up a resolved module
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name).map(|m| m.as_ref())
    }

    /// All module names, sorted
    pub fn names(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }

    /// Direct dependencies in declaration order
    pub fn direct_dependencies(&self, name: &str) -> Option<&[ModuleName]> {
        self.modules.get(name).map(|m| m.depends())
    }

    /// Every module `name` depends on, directly or transitively
    pub fn transitive_dependencies(&self, name: &str) -> Option<&BTreeSet<ModuleName>> {
        self.transitive.get(name)
    }

    /// Check if `module` (transitively) depends on `dependency`
    pub fn depends_on(&self, module: &str, dependency: &str) -> bool {
        self.transitive
            .get(module)
            .map(|deps| deps.contains(dependency))
            .unwrap_or(false)
    }

    /// Iterate `(dependent, dependency)` edges of direct dependencies
    pub fn edges(&self) -> impl Iterator<Item = (&ModuleName, &ModuleName)> {
        self.modules
            .iter()
            .flat_map(|(name, m)| m.depends().iter().map(move |dep| (name, dep)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first graph builder
pub struct GraphBuilder<'a> {
    module_root: &'a Path,
    load: Box<dyn FnMut(&ModuleName) -> ProctorResult<Arc<Module>> + 'a>,
    marks: HashMap<ModuleName, Mark>,
    modules: BTreeMap<ModuleName, Arc<Module>>,
    transitive: BTreeMap<ModuleName, BTreeSet<ModuleName>>,
}

impl<'a> GraphBuilder<'a> {
    /// Builder reading descriptors straight from disk
    pub fn new(module_root: &'a Path) -> Self {
        Self::with_loader(module_root, move |name| {
            read_module(module_root, name).map(Arc::new)
        })
    }

    /// Builder using a custom module loader
    pub fn with_loader<F>(module_root: &'a Path, load: F) -> Self
    where
        F: FnMut(&ModuleName) -> ProctorResult<Arc<Module>> + 'a,
    {
        Self {
            module_root,
            load: Box::new(load),
            marks: HashMap::new(),
            modules: BTreeMap::new(),
            transitive: BTreeMap::new(),
        }
    }

    /// Resolve `roots` and all their transitive dependencies
    ///
    /// # Errors
    ///
    /// - `ModuleNotFound` naming the missing module and its referrer
    /// - `ManifestMissing` / `ManifestParse` for invalid module directories
    /// - `DependencyCycle` naming the cycle
    pub fn resolve(mut self, roots: &[ModuleName]) -> ProctorResult<DependencyGraph> {
        let mut stack = Vec::new();
        for root in roots {
            self.visit(root, None, &mut stack)?;
        }
        let mut unique_roots = Vec::with_capacity(roots.len());
        for root in roots {
            if !unique_roots.contains(root) {
                unique_roots.push(root.clone());
            }
        }
        debug!(
            roots = ?unique_roots,
            modules = self.modules.len(),
            "resolved dependency graph"
        );
        Ok(DependencyGraph {
            module_root: self.module_root.to_path_buf(),
            roots: unique_roots,
            modules: self.modules,
            transitive: self.transitive,
        })
    }

    fn visit(
        &mut self,
        name: &ModuleName,
        referrer: Option<&ModuleName>,
        stack: &mut Vec<ModuleName>,
    ) -> ProctorResult<()> {
        match self.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|m| m == name).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|m| m.to_string()).collect();
                cycle.push(name.to_string());
                return Err(ProctorError::DependencyCycle { cycle });
            }
            None => {}
        }

        let module = (self.load)(name).map_err(|e| match e {
            ProctorError::ModuleNotFound { module, root, .. } => ProctorError::ModuleNotFound {
                module,
                referrer: referrer.map(|r| r.to_string()),
                root,
            },
            other => other,
        })?;

        self.marks.insert(name.clone(), Mark::Visiting);
        stack.push(name.clone());
        for dep in module.depends() {
            self.visit(dep, Some(name), stack)?;
        }
        stack.pop();
        self.marks.insert(name.clone(), Mark::Done);

        let mut closure = BTreeSet::new();
        for dep in module.depends() {
            closure.insert(dep.clone());
            if let Some(deps) = self.transitive.get(dep) {
                closure.extend(deps.iter().cloned());
            }
        }
        self.transitive.insert(name.clone(), closure);
        self.modules.insert(name.clone(), module);
        Ok(())
    }
}

type GraphKey = (PathBuf, BTreeSet<ModuleName>);

/// Per-run memo of parsed modules and resolved graphs
#[derive(Default)]
pub struct GraphCache {
    modules: Mutex<HashMap<PathBuf, Arc<Module>>>,
    graphs: Mutex<HashMap<GraphKey, Arc<DependencyGraph>>>,
    reads: AtomicUsize,
}

impl GraphCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (or reuse) the graph for `roots` under `module_root`
    pub fn resolve(
        &self,
        module_root: &Path,
        roots: &[ModuleName],
    ) -> ProctorResult<Arc<DependencyGraph>> {
        let key = (
            module_root.to_path_buf(),
            roots.iter().cloned().collect::<BTreeSet<_>>(),
        );
        if let Some(graph) = self.graphs.lock().get(&key) {
            debug!(roots = ?roots, "dependency graph cache hit");
            return Ok(Arc::clone(graph));
        }

        let graph = GraphBuilder::with_loader(module_root, |name| {
            self.load_module(module_root, name)
        })
        .resolve(roots)?;
        let graph = Arc::new(graph);
        self.graphs.lock().insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    /// Number of descriptors actually read from disk
    pub fn manifest_reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Drop every memoized entry
    pub fn clear(&self) {
        self.modules.lock().clear();
        self.graphs.lock().clear();
    }

    fn load_module(&self, module_root: &Path, name: &ModuleName) -> ProctorResult<Arc<Module>> {
        let path = module_root.join(name.as_str());
        if let Some(module) = self.modules.lock().get(&path) {
            return Ok(Arc::clone(module));
        }
        let module = Arc::new(read_module(module_root, name)?);
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.modules.lock().insert(path, Arc::clone(&module));
        Ok(module)
    }
}
