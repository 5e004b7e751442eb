use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cow_utils::CowUtils;
use indexmap::IndexMap;
use log::trace;

use crate::error::{BundleError, BundleResult};
use crate::registry::ModuleName;

/// Read-only access to module sources
pub trait SourceStore {
    /// Raw source text of `module`
    fn read_source(&self, module: &ModuleName) -> BundleResult<String>;
}

/// Sources laid out as `<root>/<module>.rs`
#[derive(Debug, Clone)]
pub struct FsSourceStore {
    root: PathBuf,
}

impl FsSourceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, module: &ModuleName) -> PathBuf {
        self.root.join(format!("{module}.rs"))
    }
}

impl SourceStore for FsSourceStore {
    fn read_source(&self, module: &ModuleName) -> BundleResult<String> {
        let path = self.path_for(module);
        trace!("Reading {module} from {path:?}");
        match fs::read_to_string(&path) {
            Ok(content) => Ok(normalize_line_endings(content)),
            Err(source) => Err(BundleError::SourceUnavailable {
                module: module.to_string(),
                path,
                source,
            }),
        }
    }
}

/// Sources held in memory, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemorySourceStore {
    sources: IndexMap<ModuleName, String>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: impl Into<ModuleName>, source: impl Into<String>) {
        self.sources.insert(module.into(), source.into());
    }
}

impl<M: Into<ModuleName>, S: Into<String>> FromIterator<(M, S)> for MemorySourceStore {
    fn from_iter<I: IntoIterator<Item = (M, S)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (module, source) in iter {
            store.insert(module, source);
        }
        store
    }
}

impl SourceStore for MemorySourceStore {
    fn read_source(&self, module: &ModuleName) -> BundleResult<String> {
        self.sources
            .get(module)
            .cloned()
            .ok_or_else(|| BundleError::SourceUnavailable {
                module: module.to_string(),
                path: PathBuf::from(format!("<memory>/{module}.rs")),
                source: io::Error::new(io::ErrorKind::NotFound, "no such module in store"),
            })
    }
}

/// Normalize line endings to LF so bundles are byte-identical across platforms
pub fn normalize_line_endings(content: String) -> String {
    content
        .cow_replace("\r\n", "\n")
        .cow_replace('\r', "\n")
        .into_owned()
}
