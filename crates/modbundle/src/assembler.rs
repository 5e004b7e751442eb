use log::debug;
use sha2::{Digest, Sha256};

use crate::error::BundleResult;
use crate::registry::{ModuleName, ModuleRegistry};
use crate::source_store::SourceStore;
use crate::transform::{FilterPolicy, transform};

const HEADER_PREFIX: &str = "// Bundled by modbundle";

/// One assembled bundle: the modules it contains and the resulting text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    modules: Vec<ModuleName>,
    text: String,
}

impl Bundle {
    pub fn modules(&self) -> &[ModuleName] {
        &self.modules
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Same bundle with its text replaced, e.g. by the formatted rendition
    #[must_use]
    pub fn with_text(self, text: String) -> Self {
        Self {
            modules: self.modules,
            text,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Hex SHA-256 of the text, usable as a cache key
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.text.as_bytes()))
    }
}

/// Concatenates transformed modules and their re-exports
#[derive(Debug)]
pub struct Assembler<'a, S: SourceStore + ?Sized> {
    registry: &'a ModuleRegistry,
    store: &'a S,
    header: bool,
}

impl<'a, S: SourceStore + ?Sized> Assembler<'a, S> {
    pub fn new(registry: &'a ModuleRegistry, store: &'a S) -> Self {
        Self {
            registry,
            store,
            header: true,
        }
    }

    /// Whether to start the bundle with a provenance comment
    #[must_use]
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Assemble `order` into a bundle.
    ///
    /// Fragments appear in the given order and are followed by one `use m::*;`
    /// per non-internal module, in the same order. The result depends only on
    /// the arguments and the store contents. A source that cannot be read fails
    /// the whole call.
    pub fn assemble(&self, order: &[ModuleName], policy: FilterPolicy) -> BundleResult<Bundle> {
        let mut fragments = Vec::with_capacity(order.len());
        for module in order {
            let source = self.store.read_source(module)?;
            let fragment = transform(module, &source, policy);
            debug!(
                "Transformed {module}: {} -> {} bytes",
                source.len(),
                fragment.len()
            );
            fragments.push(fragment);
        }

        let mut text = String::new();
        if self.header {
            text.push_str(HEADER_PREFIX);
            if !order.is_empty() {
                let names: Vec<&str> = order.iter().map(ModuleName::as_str).collect();
                text.push_str(&format!(": {}", names.join(", ")));
            }
            text.push_str("\n\n");
        }

        text.push_str(&fragments.join("\n"));

        let reexports: Vec<&ModuleName> = order
            .iter()
            .filter(|module| !self.registry.is_internal(module.as_str()))
            .collect();
        if !reexports.is_empty() {
            text.push('\n');
            for module in reexports {
                text.push_str(&format!("use {module}::*;\n"));
            }
        }

        Ok(Bundle {
            modules: order.to_vec(),
            text,
        })
    }
}
