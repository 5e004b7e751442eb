use log::{debug, trace};
use rustc_hash::FxHashSet;

use crate::error::BundleResult;
use crate::registry::{ModuleName, ModuleRegistry};

/// Computes the dependency closure of a set of requested modules
#[derive(Debug, Clone, Copy)]
pub struct ClosureResolver<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> ClosureResolver<'a> {
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `roots` to their transitive closure, sorted by module name.
    ///
    /// Every root is validated before traversal starts, so an unknown name aborts
    /// the whole resolution. The order of `roots` and any duplicates in it have no
    /// effect on the result.
    pub fn resolve<I, S>(&self, roots: I) -> BundleResult<Vec<ModuleName>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut worklist: Vec<&'a ModuleName> = Vec::new();
        for root in roots {
            worklist.push(self.registry.lookup(root.as_ref())?);
        }
        debug!(
            "Resolving closure of {:?}",
            worklist.iter().map(|m| m.as_str()).collect::<Vec<_>>()
        );

        let mut visited: FxHashSet<&'a ModuleName> = FxHashSet::default();
        while let Some(module) = worklist.pop() {
            if !visited.insert(module) {
                continue;
            }
            let deps = self.registry.direct_dependencies(module.as_str())?;
            trace!("{module} -> {deps:?}");
            worklist.extend(deps.iter().filter(|dep| !visited.contains(dep)));
        }

        let mut resolved: Vec<ModuleName> = visited.into_iter().cloned().collect();
        resolved.sort();
        debug!(
            "Resolved {} modules: {}",
            resolved.len(),
            resolved
                .iter()
                .map(ModuleName::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(resolved)
    }

    /// Every registered module, in canonical order
    pub fn resolve_all(&self) -> Vec<ModuleName> {
        self.registry.all_modules().cloned().collect()
    }
}
