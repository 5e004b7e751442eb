use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::Path;

use crate::assembler::{Assembler, Bundle};
use crate::config::Config;
use crate::formatter::{ExternalFormatter, format_bundle, locate_rustfmt};
use crate::registry::ModuleRegistry;
use crate::resolver::ClosureResolver;
use crate::source_store::{FsSourceStore, SourceStore};

/// Runs the whole pipeline for one invocation: resolve, assemble, format
#[derive(Debug)]
pub struct BundleOrchestrator {
    config: Config,
    registry: ModuleRegistry,
}

impl BundleOrchestrator {
    /// Build an orchestrator with the registry selected by `config`
    pub fn new(config: Config) -> Result<Self> {
        let registry = config.registry()?;
        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: Config, registry: ModuleRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Every registered module name, in canonical order
    pub fn all_module_names(&self) -> Vec<String> {
        ClosureResolver::new(&self.registry)
            .resolve_all()
            .into_iter()
            .map(|module| module.to_string())
            .collect()
    }

    /// Resolve and assemble `roots` from the configured source directory
    pub fn bundle_core(&self, roots: &[String]) -> Result<Bundle> {
        let store = FsSourceStore::new(&self.config.src);
        debug!("Reading module sources from {:?}", store.root());
        self.bundle_from_store(roots, &store)
    }

    /// Resolve and assemble `roots` from an arbitrary source store
    pub fn bundle_from_store<S: SourceStore + ?Sized>(
        &self,
        roots: &[String],
        store: &S,
    ) -> Result<Bundle> {
        let order = ClosureResolver::new(&self.registry).resolve(roots)?;
        info!(
            "Bundling {} modules for {} requested",
            order.len(),
            roots.len()
        );

        let bundle = Assembler::new(&self.registry, store)
            .with_header(self.config.header)
            .assemble(&order, self.config.filter_policy())?;

        let bundle = if self.config.format {
            let program = locate_rustfmt(self.config.rustfmt.as_deref());
            let formatter = ExternalFormatter::rustfmt(program, &self.config.edition)
                .with_timeout(self.config.format_timeout);
            let text = bundle.text().to_owned();
            let outcome = format_bundle(&formatter, text, self.config.strict_format)?;
            bundle.with_text(outcome.into_text())
        } else {
            debug!("Formatting disabled");
            bundle
        };

        info!(
            "Expanded {} modules ({} B, sha256 {})",
            bundle.modules().len(),
            bundle.len(),
            bundle.digest()
        );
        Ok(bundle)
    }

    /// Bundle to string for stdout output
    pub fn bundle_to_string(&self, roots: &[String]) -> Result<String> {
        Ok(self.bundle_core(roots)?.into_text())
    }

    /// Bundle and write the result to `output_path`
    pub fn bundle(&self, roots: &[String], output_path: &Path) -> Result<()> {
        let bundle = self.bundle_core(roots)?;
        fs::write(output_path, bundle.text())
            .with_context(|| format!("Failed to write output file: {:?}", output_path))?;
        info!("Wrote {}", output_path.display());
        Ok(())
    }

    /// One line per registered module: name, dependencies and internal marker
    pub fn describe_registry(&self) -> String {
        let mut out = String::new();
        for module in self.registry.all_modules() {
            out.push_str(module.as_str());
            if let Ok(deps) = self.registry.direct_dependencies(module.as_str()) {
                if !deps.is_empty() {
                    let deps: Vec<&str> = deps.iter().map(|dep| dep.as_str()).collect();
                    out.push_str(&format!(": {}", deps.join(", ")));
                }
            }
            if self.registry.is_internal(module.as_str()) {
                out.push_str(" (internal)");
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BundleError;
    use crate::source_store::MemorySourceStore;
    use pretty_assertions::assert_eq;

    fn unformatted() -> Config {
        Config {
            format: false,
            ..Default::default()
        }
    }

    fn roots(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn test_unknown_module_is_typed() {
        let orchestrator = BundleOrchestrator::new(unformatted()).unwrap();
        let err = orchestrator
            .bundle_from_store(&roots(&["segtree", "bogus"]), &MemorySourceStore::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::UnknownModule(name)) if name == "bogus"
        ));
    }

    #[test]
    fn test_bundle_from_memory_store() {
        let orchestrator = BundleOrchestrator::new(unformatted()).unwrap();
        let store: MemorySourceStore = [
            ("internal_bit", "pub(crate) fn ceil_pow2() {}\n"),
            ("segtree", "use crate::internal_bit::ceil_pow2;\n// doc\n"),
        ]
        .into_iter()
        .collect();

        let bundle = orchestrator
            .bundle_from_store(&roots(&["segtree"]), &store)
            .unwrap();
        assert_eq!(
            bundle.text(),
            "// Bundled by modbundle: internal_bit, segtree\n\n\
             pub mod internal_bit {\npub(crate) fn ceil_pow2() {}\n}\n\n\
             pub mod segtree {\nuse crate::internal_bit::ceil_pow2;\n}\n\n\
             use segtree::*;\n"
        );
    }

    #[test]
    fn test_describe_registry() {
        let orchestrator = BundleOrchestrator::new(unformatted()).unwrap();
        let listing = orchestrator.describe_registry();
        assert!(listing.starts_with("convolution: internal_bit, internal_math, modint\n"));
        assert!(listing.contains("\ninternal_bit (internal)\n"));
        assert!(listing.contains("\ndsu\n"));
        assert_eq!(listing.lines().count(), 17);
    }

    #[test]
    fn test_all_module_names_are_sorted() {
        let orchestrator = BundleOrchestrator::new(unformatted()).unwrap();
        let names = orchestrator.all_module_names();
        assert_eq!(names.first().map(String::as_str), Some("convolution"));
        assert_eq!(names.last().map(String::as_str), Some("twosat"));
    }
}
