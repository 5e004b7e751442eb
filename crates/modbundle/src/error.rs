use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the bundling pipeline.
///
/// Every variant names the module or tool at fault so that the CLI can print a
/// diagnostic without further context.
#[derive(Debug, Error)]
pub enum BundleError {
    /// A requested root, or a dependency listed in the table, is not registered
    #[error("unknown module `{0}`")]
    UnknownModule(String),

    /// The dependency table contains a cycle through the listed modules
    #[error("cyclic dependency between modules: {}", .0.join(" → "))]
    CyclicDependency(Vec<String>),

    /// A resolved module has no readable source in the store
    #[error("source for module `{module}` is unavailable at {path:?}")]
    SourceUnavailable {
        module: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The external formatter could not produce output
    #[error("`{tool}` failed to format the bundle: {reason}")]
    FormattingFailed { tool: String, reason: String },
}

pub type BundleResult<T> = Result<T, BundleError>;
