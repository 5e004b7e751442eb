use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::combine::Combine;
use crate::dirs::{project_config_file, system_config_file, user_config_file};
use crate::registry::{DEFAULT_INTERNAL_PREFIX, DependencyTable, ModuleRegistry};
use crate::transform::FilterPolicy;

/// Editions accepted by `rustfmt --edition`
const SUPPORTED_EDITIONS: &[&str] = &["2015", "2018", "2021", "2024"];

/// Effective configuration for one bundling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one `<module>.rs` file per registered module
    pub src: PathBuf,

    /// Keep comment-only lines in the output
    pub keep_comments: bool,

    /// Keep `#[cfg(test)]` sections in the output
    pub keep_tests: bool,

    /// Start the bundle with a provenance comment
    pub header: bool,

    /// Run the bundle through rustfmt
    pub format: bool,

    /// Treat a formatter failure as fatal instead of emitting unformatted output
    pub strict_format: bool,

    /// Explicit rustfmt executable; located automatically when unset
    pub rustfmt: Option<PathBuf>,

    /// Edition passed to rustfmt
    pub edition: String,

    /// Upper bound on the formatter's running time
    pub format_timeout: Option<Duration>,

    /// Module name prefix marking implementation-only modules
    pub internal_prefix: String,

    /// Custom dependency table replacing the built-in one
    pub modules: Option<DependencyTable>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: PathBuf::from("src"),
            keep_comments: false,
            keep_tests: false,
            header: true,
            format: true,
            strict_format: false,
            rustfmt: None,
            edition: "2021".to_owned(),
            format_timeout: None,
            internal_prefix: DEFAULT_INTERNAL_PREFIX.to_owned(),
            modules: None,
        }
    }
}

/// One configuration layer as written in a `modbundle.toml` file.
///
/// Every key is optional so that layers can be stacked with [`Combine`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub src: Option<PathBuf>,
    pub keep_comments: Option<bool>,
    pub keep_tests: Option<bool>,
    pub header: Option<bool>,
    pub format: Option<bool>,
    pub strict_format: Option<bool>,
    pub rustfmt: Option<PathBuf>,
    pub edition: Option<String>,
    /// Seconds
    pub format_timeout: Option<u64>,
    pub internal_prefix: Option<String>,
    pub modules: Option<DependencyTable>,
}

impl Combine for ConfigFile {
    fn combine(self, other: Self) -> Self {
        Self {
            src: self.src.combine(other.src),
            keep_comments: self.keep_comments.combine(other.keep_comments),
            keep_tests: self.keep_tests.combine(other.keep_tests),
            header: self.header.combine(other.header),
            format: self.format.combine(other.format),
            strict_format: self.strict_format.combine(other.strict_format),
            rustfmt: self.rustfmt.combine(other.rustfmt),
            edition: self.edition.combine(other.edition),
            format_timeout: self.format_timeout.combine(other.format_timeout),
            internal_prefix: self.internal_prefix.combine(other.internal_prefix),
            modules: self.modules.combine(other.modules),
        }
    }
}

impl ConfigFile {
    /// Load a single config file from a path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let file: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if let Some(edition) = &file.edition {
            Config::parse_edition(edition)
                .with_context(|| format!("Invalid edition in config file: {:?}", path))?;
        }

        Ok(file)
    }

    /// Configuration values from environment variables with the `MODBUNDLE_` prefix
    pub fn from_env() -> Self {
        let mut file = Self::default();

        if let Some(src) = env_string("MODBUNDLE_SRC") {
            file.src = Some(PathBuf::from(src));
        }
        file.keep_comments = env_bool("MODBUNDLE_KEEP_COMMENTS");
        file.keep_tests = env_bool("MODBUNDLE_KEEP_TESTS");
        file.strict_format = env_bool("MODBUNDLE_STRICT_FORMAT");
        file.rustfmt = env_string("MODBUNDLE_RUSTFMT").map(PathBuf::from);
        file.edition = env_string("MODBUNDLE_EDITION");

        file
    }

    /// Resolve the layer against the defaults
    pub fn into_config(self) -> Result<Config> {
        let defaults = Config::default();
        let edition = self.edition.unwrap_or(defaults.edition);
        Config::parse_edition(&edition)?;

        Ok(Config {
            src: self.src.unwrap_or(defaults.src),
            keep_comments: self.keep_comments.unwrap_or(defaults.keep_comments),
            keep_tests: self.keep_tests.unwrap_or(defaults.keep_tests),
            header: self.header.unwrap_or(defaults.header),
            format: self.format.unwrap_or(defaults.format),
            strict_format: self.strict_format.unwrap_or(defaults.strict_format),
            rustfmt: self.rustfmt,
            edition,
            format_timeout: self.format_timeout.map(Duration::from_secs),
            internal_prefix: self.internal_prefix.unwrap_or(defaults.internal_prefix),
            modules: self.modules,
        })
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    let value = env_string(name)?;
    let parsed = parse_bool(&value);
    if parsed.is_none() {
        log::warn!("Ignoring {name}={value:?}: expected a boolean");
    }
    parsed
}

/// Parse a boolean value from string, supporting various common formats
fn parse_bool(value: &str) -> Option<bool> {
    use cow_utils::CowUtils;
    match value.cow_to_lowercase().as_ref() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Validate an edition string for rustfmt
    pub fn parse_edition(edition: &str) -> Result<&'static str> {
        SUPPORTED_EDITIONS
            .iter()
            .find(|supported| **supported == edition)
            .copied()
            .ok_or_else(|| {
                anyhow!(
                    "Invalid edition '{}'. Supported editions: {}",
                    edition,
                    SUPPORTED_EDITIONS.join(", ")
                )
            })
    }

    /// Set the edition from a string value
    pub fn set_edition(&mut self, edition: String) -> Result<()> {
        Self::parse_edition(&edition)?;
        self.edition = edition;
        Ok(())
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            keep_comments: self.keep_comments,
            keep_test_blocks: self.keep_tests,
        }
    }

    /// The registry this configuration selects: the custom table if one is
    /// configured, the built-in one otherwise
    pub fn registry(&self) -> Result<ModuleRegistry> {
        match &self.modules {
            Some(table) => ModuleRegistry::from_table(table, &self.internal_prefix)
                .context("Invalid [modules] table in configuration"),
            None if self.internal_prefix == DEFAULT_INTERNAL_PREFIX => {
                Ok(ModuleRegistry::builtin()?)
            }
            None => Err(anyhow!(
                "internal-prefix '{}' requires a custom [modules] table",
                self.internal_prefix
            )),
        }
    }

    /// Load configuration with hierarchical precedence:
    /// 1. CLI-provided config path (highest precedence)
    /// 2. Environment variables (MODBUNDLE_*)
    /// 3. Project config (modbundle.toml in current directory)
    /// 4. User config (~/.config/modbundle/modbundle.toml)
    /// 5. System config (/etc/modbundle/modbundle.toml or equivalent)
    /// 6. Default values (lowest precedence)
    pub fn load(cli_config_path: Option<&Path>) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(path) = cli_config_path {
            log::debug!("Loading CLI config from: {:?}", path);
            layers.push(ConfigFile::load(path).context("Failed to load CLI config")?);
        }

        layers.push(ConfigFile::from_env());

        let files = [
            ("project config", project_config_file()),
            ("user config", user_config_file()),
            ("system config", system_config_file()),
        ];
        for (context, path) in files {
            if let Some(path) = path {
                log::debug!("Loading {} from: {:?}", context, path);
                layers.push(
                    ConfigFile::load(&path)
                        .with_context(|| format!("Failed to load {} from {:?}", context, path))?,
                );
            }
        }

        layers
            .into_iter()
            .reduce(Combine::combine)
            .unwrap_or_default()
            .into_config()
            .context("Invalid final configuration")
    }
}
