//! Canonical formatting through an external tool (`rustfmt` by default).
//!
//! The text is written to a file inside a fresh temporary directory, the tool
//! rewrites that file in place, and the result is read back. The directory is
//! removed when the [`tempfile::TempDir`] guard drops, on success and on every
//! error path alike.
use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{BundleError, BundleResult};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Something that can rewrite source text into canonical form
pub trait SourceFormatter {
    /// Tool name used in diagnostics
    fn name(&self) -> &str;

    fn format(&self, text: &str) -> BundleResult<String>;
}

/// Result of formatting in lenient mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    Formatted(String),
    /// The formatter failed; `text` is the input, unchanged
    Unformatted { text: String, reason: String },
}

impl FormatOutcome {
    pub fn is_formatted(&self) -> bool {
        matches!(self, Self::Formatted(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Formatted(text) | Self::Unformatted { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Formatted(text) | Self::Unformatted { text, .. } => text,
        }
    }
}

/// Format `text`, falling back to the unformatted input unless `strict` is set
pub fn format_bundle(
    formatter: &dyn SourceFormatter,
    text: String,
    strict: bool,
) -> BundleResult<FormatOutcome> {
    match formatter.format(&text) {
        Ok(formatted) => Ok(FormatOutcome::Formatted(formatted)),
        Err(err) if strict => Err(err),
        Err(err) => {
            warn!("{err}; emitting the bundle unformatted");
            Ok(FormatOutcome::Unformatted {
                text,
                reason: err.to_string(),
            })
        }
    }
}

/// An external program invoked as `<program> <args>... <file>`
#[derive(Debug, Clone)]
pub struct ExternalFormatter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
    name: String,
}

impl ExternalFormatter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            program,
            args: Vec::new(),
            timeout: None,
            name,
        }
    }

    /// `rustfmt --edition <edition> <file>`
    pub fn rustfmt(program: impl Into<PathBuf>, edition: &str) -> Self {
        Self::new(program).args(["--edition", edition])
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Kill the tool and fail if it runs longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn failed(&self, reason: impl Into<String>) -> BundleError {
        BundleError::FormattingFailed {
            tool: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn wait(&self, child: &mut Child) -> BundleResult<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child
                .wait()
                .map_err(|e| self.failed(format!("could not wait for the process: {e}")));
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.failed(format!("timed out after {timeout:?}")));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(self.failed(format!("could not wait for the process: {e}")));
                }
            }
        }
    }
}

impl SourceFormatter for ExternalFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self, text: &str) -> BundleResult<String> {
        let tempdir = tempfile::Builder::new()
            .prefix("modbundle")
            .tempdir()
            .map_err(|e| self.failed(format!("could not create a temporary directory: {e}")))?;
        let path = tempdir.path().join("bundle.rs");
        let stderr_path = tempdir.path().join("stderr.log");

        fs::write(&path, text)
            .map_err(|e| self.failed(format!("could not write {}: {e}", path.display())))?;
        let stderr = File::create(&stderr_path)
            .map_err(|e| self.failed(format!("could not capture diagnostics: {e}")))?;

        debug!(
            "Running {} {} {}",
            self.program.display(),
            self.args.join(" "),
            path.display()
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .map_err(|e| self.failed(format!("could not run {}: {e}", self.program.display())))?;

        let status = self.wait(&mut child)?;
        if !status.success() {
            let diagnostics = fs::read_to_string(&stderr_path).unwrap_or_default();
            let diagnostics = diagnostics.trim();
            return Err(self.failed(if diagnostics.is_empty() {
                format!("exited with {status}")
            } else {
                format!("exited with {status}: {diagnostics}")
            }));
        }

        let formatted = fs::read_to_string(&path)
            .map_err(|e| self.failed(format!("could not read the formatted output: {e}")))?;
        tempdir
            .close()
            .map_err(|e| self.failed(format!("could not remove the temporary directory: {e}")))?;
        Ok(formatted)
    }
}

/// Pick the rustfmt executable: an explicit path, the one next to `$CARGO`, or
/// whatever `rustfmt` resolves to on `PATH`.
pub fn locate_rustfmt(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    if let Some(cargo) = env::var_os("CARGO") {
        let candidate = Path::new(&cargo)
            .with_file_name("rustfmt")
            .with_extension(env::consts::EXE_EXTENSION);
        if candidate.is_file() {
            debug!("Using rustfmt next to $CARGO: {}", candidate.display());
            return candidate;
        }
    }

    PathBuf::from("rustfmt")
}
