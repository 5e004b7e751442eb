//! Module registry: the set of bundleable modules and their declared dependencies.
//!
//! The table is maintained by hand next to the library sources and is the only
//! place dependencies are known; nothing here inspects source text. A registry is
//! validated once when it is built (every edge must point at a registered module
//! and the edge set must be acyclic) and is read-only afterwards.
use std::borrow::Borrow;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use log::{debug, error};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{BundleError, BundleResult};

/// Prefix that marks implementation-only modules
pub const DEFAULT_INTERNAL_PREFIX: &str = "internal";

/// Dependency table of the bundled library, `(module, direct dependencies)`
const BUILTIN_TABLE: &[(&str, &[&str])] = &[
    ("convolution", &["internal_bit", "internal_math", "modint"]),
    ("dsu", &[]),
    ("fenwicktree", &[]),
    ("lazysegtree", &["internal_bit", "segtree"]),
    ("math", &["internal_math"]),
    ("maxflow", &["internal_queue", "internal_type_traits"]),
    ("mincostflow", &[]),
    ("modint", &["internal_math"]),
    ("scc", &["internal_scc"]),
    ("segtree", &["internal_bit"]),
    ("string", &[]),
    ("twosat", &["internal_scc"]),
    ("internal_bit", &[]),
    ("internal_math", &[]),
    ("internal_queue", &[]),
    ("internal_scc", &[]),
    ("internal_type_traits", &[]),
];

/// Table form accepted from configuration: module name to direct dependencies
pub type DependencyTable = IndexMap<String, Vec<String>>;

/// Name of a registered module, ordered by its text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ModuleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Immutable module registry
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    /// Modules sorted by name, each with its sorted direct dependencies
    modules: IndexMap<ModuleName, IndexSet<ModuleName>>,
    internal_prefix: String,
}

impl ModuleRegistry {
    /// Registry for the library shipped with the bundler
    pub fn builtin() -> BundleResult<Self> {
        let table: DependencyTable = BUILTIN_TABLE
            .iter()
            .map(|(name, deps)| {
                (
                    (*name).to_owned(),
                    deps.iter().map(|dep| (*dep).to_owned()).collect(),
                )
            })
            .collect();
        Self::from_table(&table, DEFAULT_INTERNAL_PREFIX)
    }

    /// Build a registry from a dependency table, rejecting dangling edges and cycles
    pub fn from_table(table: &DependencyTable, internal_prefix: &str) -> BundleResult<Self> {
        let mut modules: IndexMap<ModuleName, IndexSet<ModuleName>> = table
            .iter()
            .map(|(name, deps)| {
                let deps = deps.iter().map(|dep| ModuleName::new(dep.as_str())).collect();
                (ModuleName::new(name.as_str()), deps)
            })
            .collect();

        for (name, deps) in &modules {
            if let Some(missing) = deps.iter().find(|dep| !modules.contains_key(dep.as_str())) {
                error!("Module `{name}` depends on unregistered module `{missing}`");
                return Err(BundleError::UnknownModule(missing.to_string()));
            }
        }

        modules.sort_keys();
        for deps in modules.values_mut() {
            deps.sort();
        }

        let registry = Self {
            modules,
            internal_prefix: internal_prefix.to_owned(),
        };
        registry.check_acyclic()?;

        debug!(
            "Registry loaded with {} modules (internal prefix `{}`)",
            registry.modules.len(),
            registry.internal_prefix
        );
        Ok(registry)
    }

    /// Fail with the members of the smallest-named cycle if the table has any
    fn check_acyclic(&self) -> BundleResult<()> {
        let mut graph: DiGraph<&ModuleName, ()> = DiGraph::new();
        let nodes: IndexMap<&ModuleName, NodeIndex> = self
            .modules
            .keys()
            .map(|name| (name, graph.add_node(name)))
            .collect();

        for (name, deps) in &self.modules {
            for dep in deps {
                graph.add_edge(nodes[name], nodes[dep], ());
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut members: Vec<String> = component
                    .into_iter()
                    .map(|node| graph[node].to_string())
                    .collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();

        match cycles.into_iter().next() {
            Some(members) => Err(BundleError::CyclicDependency(members)),
            None => Ok(()),
        }
    }

    /// All registered modules in canonical order
    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Registered name matching `name`, or `UnknownModule`
    pub fn lookup(&self, name: &str) -> BundleResult<&ModuleName> {
        self.modules
            .get_key_value(name)
            .map(|(key, _)| key)
            .ok_or_else(|| BundleError::UnknownModule(name.to_owned()))
    }

    /// Direct dependencies of `name`, empty for leaf modules
    pub fn direct_dependencies(&self, name: &str) -> BundleResult<&IndexSet<ModuleName>> {
        self.modules
            .get(name)
            .ok_or_else(|| BundleError::UnknownModule(name.to_owned()))
    }

    /// Whether `name` is implementation-only and gets no re-export
    pub fn is_internal(&self, name: &str) -> bool {
        name.starts_with(&self.internal_prefix)
    }

    pub fn internal_prefix(&self) -> &str {
        &self.internal_prefix
    }
}
