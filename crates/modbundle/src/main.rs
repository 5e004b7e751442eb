use anyhow::bail;
use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use modbundle::config::Config;
use modbundle::orchestrator::BundleOrchestrator;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Modules to bundle; their dependencies are added automatically
    modules: Vec<String>,

    /// Bundle every registered module
    #[arg(long, conflicts_with = "modules")]
    all: bool,

    /// Print the registered modules with their dependencies and exit
    #[arg(long, conflicts_with_all = ["modules", "all", "output"])]
    list: bool,

    /// Write the bundle to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Keep comment-only lines
    #[arg(short = 'c', long)]
    keep_comments: bool,

    /// Keep #[cfg(test)] sections
    #[arg(short = 't', long)]
    keep_tests: bool,

    /// Directory containing one <module>.rs file per module
    #[arg(long, value_name = "DIR")]
    src: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Skip rustfmt and emit the raw bundle
    #[arg(long, conflicts_with = "strict_format")]
    no_format: bool,

    /// Fail instead of emitting unformatted output when rustfmt fails
    #[arg(long)]
    strict_format: bool,

    /// Omit the provenance comment at the top of the bundle
    #[arg(long)]
    no_header: bool,

    /// Edition passed to rustfmt (2015, 2018, 2021, 2024)
    #[arg(long)]
    edition: Option<String>,

    /// rustfmt executable to use
    #[arg(long, value_name = "PATH")]
    rustfmt: Option<PathBuf>,

    /// Kill rustfmt if it runs longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    format_timeout: Option<u64>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    fn apply_to(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(src) = &self.src {
            config.src.clone_from(src);
        }
        if self.keep_comments {
            config.keep_comments = true;
        }
        if self.keep_tests {
            config.keep_tests = true;
        }
        if self.no_format {
            config.format = false;
        }
        if self.strict_format {
            config.strict_format = true;
        }
        if self.no_header {
            config.header = false;
        }
        if let Some(edition) = &self.edition {
            config.set_edition(edition.clone())?;
        }
        if let Some(rustfmt) = &self.rustfmt {
            config.rustfmt = Some(rustfmt.clone());
        }
        if let Some(seconds) = self.format_timeout {
            config.format_timeout = Some(Duration::from_secs(seconds));
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",  // Default: warnings and errors only
        1 => "info",  // -v: informational messages
        2 => "debug", // -vv: debug messages
        _ => "trace", // -vvv or more: trace messages
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();
    debug!(
        "Verbosity level: {} (log level: {})",
        cli.verbose, log_level
    );

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config)?;
    debug!("Configuration: {:?}", config);

    let orchestrator = BundleOrchestrator::new(config)?;
    let mut stdout = io::stdout().lock();

    if cli.list {
        stdout.write_all(orchestrator.describe_registry().as_bytes())?;
        stdout.flush()?;
        return Ok(());
    }

    let roots = if cli.all {
        orchestrator.all_module_names()
    } else {
        cli.modules.clone()
    };
    if roots.is_empty() {
        bail!("No modules requested; pass module names, --all or --list");
    }
    info!("Requested modules: {}", roots.join(", "));

    if let Some(output) = &cli.output {
        orchestrator.bundle(&roots, output)?;
    } else {
        let bundled_code = orchestrator.bundle_to_string(&roots)?;
        stdout.write_all(bundled_code.as_bytes())?;
        stdout.flush()?;
        info!("Bundle written to stdout");
    }

    Ok(())
}
