//! Topological sequencing of modules
//!
//! Kahn's algorithm over the subgraph reachable from the requested modules.
//! Among ready modules the one with the smallest rank wins, where rank is the
//! index of the earliest requested module that is, or transitively needs,
//! that module. Ties on rank fall back to the name, so the order is fully
//! deterministic.

use crate::graph::{DependencyGraph, GraphCache};
use proctor_core::{ModuleName, ProctorError, ProctorResult};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Order `requested` and all their dependencies, dependencies first
///
/// Every module appears exactly once.
///
/// # Errors
///
/// - `UnknownModule` if a requested module is not in the graph
/// - `DependencyCycle` if some modules can never be scheduled
pub fn order(graph: &DependencyGraph, requested: &[ModuleName]) -> ProctorResult<Vec<ModuleName>> {
    for name in requested {
        if !graph.contains(name) {
            return Err(ProctorError::UnknownModule {
                module: name.to_string(),
            });
        }
    }

    // rank: earliest requested index that reaches the module
    let mut rank: BTreeMap<&ModuleName, usize> = BTreeMap::new();
    for (idx, name) in requested.iter().enumerate() {
        let closure = graph.transitive_dependencies(name).into_iter().flatten();
        for member in std::iter::once(name).chain(closure) {
            rank.entry(member).or_insert(idx);
        }
    }

    // in-degree counts unscheduled dependencies within the subgraph
    let mut pending: BTreeMap<&ModuleName, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&ModuleName, Vec<&ModuleName>> = BTreeMap::new();
    for &name in rank.keys() {
        let deps = graph.direct_dependencies(name).unwrap_or(&[]);
        let mut unique = BTreeSet::new();
        for dep in deps {
            if unique.insert(dep) {
                dependents.entry(dep).or_default().push(name);
            }
        }
        pending.insert(name, unique.len());
    }

    let mut ready: BTreeSet<(usize, &ModuleName)> = pending
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&name, _)| (rank[name], name))
        .collect();

    let mut sequence = Vec::with_capacity(rank.len());
    while let Some((_, name)) = ready.pop_first() {
        sequence.push(name.clone());
        for &dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert((rank[dependent], dependent));
                }
            }
        }
    }

    if sequence.len() != rank.len() {
        let scheduled: BTreeSet<&ModuleName> = sequence.iter().collect();
        let mut cycle: Vec<String> = rank
            .keys()
            .filter(|name| !scheduled.contains(*name))
            .map(|name| name.to_string())
            .collect();
        if let Some(first) = cycle.first().cloned() {
            cycle.push(first);
        }
        return Err(ProctorError::DependencyCycle { cycle });
    }

    Ok(sequence)
}

/// Sort `modules` so that dependencies come before their dependents
///
/// Unlike [`order`], only the given modules are returned.
pub fn sort_modules_by_dependencies(
    modules: &[ModuleName],
    module_root: &Path,
    cache: &GraphCache,
) -> ProctorResult<Vec<ModuleName>> {
    let graph = cache.resolve(module_root, modules)?;
    let wanted: BTreeSet<&ModuleName> = modules.iter().collect();
    Ok(order(&graph, modules)?
        .into_iter()
        .filter(|name| wanted.contains(name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::manifest::MANIFEST_FILE;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn addons(modules: &[(String, Vec<String>)]) -> TempDir {
        let root = TempDir::new().unwrap();
        for (name, deps) in modules {
            let dir = root.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            let deps: Vec<String> = deps.iter().map(|d| format!("'{}'", d)).collect();
            std::fs::write(
                dir.join(MANIFEST_FILE),
                format!("{{'depends': [{}]}}", deps.join(", ")),
            )
            .unwrap();
        }
        root
    }

    fn tree(modules: &[(&str, &[&str])]) -> TempDir {
        let owned: Vec<(String, Vec<String>)> = modules
            .iter()
            .map(|(n, d)| (n.to_string(), d.iter().map(|s| s.to_string()).collect()))
            .collect();
        addons(&owned)
    }

    fn names(items: &[&str]) -> Vec<ModuleName> {
        items.iter().map(|s| ModuleName::from(*s)).collect()
    }

    fn sequence(root: &TempDir, requested: &[&str]) -> Vec<String> {
        let requested = names(requested);
        let graph = GraphBuilder::new(root.path()).resolve(&requested).unwrap();
        order(&graph, &requested)
            .unwrap()
            .into_iter()
            .map(ModuleName::into_string)
            .collect()
    }

    fn standard_tree() -> TempDir {
        tree(&[
            ("base", &[]),
            ("module_a", &["base"]),
            ("module_b", &["base", "module_a"]),
            ("module_c", &["module_b"]),
        ])
    }

    #[test]
    fn test_chain_is_ordered_dependencies_first() {
        let root = standard_tree();
        assert_eq!(
            sequence(&root, &["module_c"]),
            vec!["base", "module_a", "module_b", "module_c"]
        );
    }

    #[test]
    fn test_each_module_appears_once() {
        let root = standard_tree();
        let seq = sequence(&root, &["module_c", "module_b", "module_a", "base"]);
        assert_eq!(seq.len(), 4);
        assert_eq!(seq, vec!["base", "module_a", "module_b", "module_c"]);
    }

    #[test]
    fn test_requested_order_breaks_ties() {
        let root = tree(&[("base", &[]), ("sale", &["base"]), ("stock", &["base"])]);
        assert_eq!(sequence(&root, &["stock", "sale"]), vec!["base", "stock", "sale"]);
        assert_eq!(sequence(&root, &["sale", "stock"]), vec!["base", "sale", "stock"]);
    }

    #[test]
    fn test_name_breaks_remaining_ties() {
        let root = tree(&[("zeta", &[]), ("alpha", &[]), ("top", &["zeta", "alpha"])]);
        assert_eq!(sequence(&root, &["top"]), vec!["alpha", "zeta", "top"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let root = standard_tree();
        let first = sequence(&root, &["module_c", "module_a"]);
        for _ in 0..5 {
            assert_eq!(sequence(&root, &["module_c", "module_a"]), first);
        }
    }

    #[test]
    fn test_unknown_requested_module() {
        let root = standard_tree();
        let graph = GraphBuilder::new(root.path())
            .resolve(&names(&["module_a"]))
            .unwrap();
        let err = order(&graph, &names(&["module_c"])).unwrap_err();
        assert!(matches!(err, ProctorError::UnknownModule { ref module } if module == "module_c"));
    }

    #[test]
    fn test_sort_modules_returns_only_requested() {
        let root = standard_tree();
        let cache = GraphCache::new();
        let sorted = sort_modules_by_dependencies(
            &names(&["module_c", "module_a"]),
            root.path(),
            &cache,
        )
        .unwrap();
        assert_eq!(sorted, names(&["module_a", "module_c"]));
    }

    #[test]
    fn test_sort_modules_propagates_cycle() {
        let root = tree(&[("a", &["b"]), ("b", &["a"])]);
        let cache = GraphCache::new();
        let err = sort_modules_by_dependencies(&names(&["a"]), root.path(), &cache).unwrap_err();
        assert!(matches!(err, ProctorError::DependencyCycle { .. }));
    }

    // ========================================================================
    // Property: every dependency precedes its dependents
    // ========================================================================

    /// Random DAG: module `m{i}` may only depend on `m{j}` with `j < i`
    fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..12).prop_flat_map(|n| {
            (0..n)
                .map(|i| {
                    if i == 0 {
                        Just(Vec::new()).boxed()
                    } else {
                        proptest::collection::vec(0..i, 0..=i.min(3)).boxed()
                    }
                })
                .collect::<Vec<_>>()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_dependencies_precede_dependents(
            deps in dag_strategy(),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..4),
        ) {
            let modules: Vec<(String, Vec<String>)> = deps
                .iter()
                .enumerate()
                .map(|(i, ds)| (format!("m{}", i), ds.iter().map(|d| format!("m{}", d)).collect()))
                .collect();
            let root = addons(&modules);
            let requested: Vec<ModuleName> = picks
                .iter()
                .map(|p| ModuleName::from(format!("m{}", p.index(deps.len()))))
                .collect();

            let graph = GraphBuilder::new(root.path()).resolve(&requested).unwrap();
            let seq = order(&graph, &requested).unwrap();
            let position: BTreeMap<&ModuleName, usize> =
                seq.iter().enumerate().map(|(i, m)| (m, i)).collect();

            prop_assert_eq!(position.len(), seq.len());
            prop_assert_eq!(seq.len(), graph.len());
            for (dependent, dependency) in graph.edges() {
                prop_assert!(position[dependency] < position[dependent]);
            }
        }
    }
}
