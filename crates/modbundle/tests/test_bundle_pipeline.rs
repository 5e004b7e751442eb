#![allow(clippy::disallowed_methods)]

use anyhow::Result;
use modbundle::BundleError;
use modbundle::config::Config;
use modbundle::formatter::{ExternalFormatter, SourceFormatter, locate_rustfmt};
use modbundle::orchestrator::BundleOrchestrator;
use modbundle::registry::{DependencyTable, ModuleRegistry};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Write a small but realistic source file for every registered module
fn write_library(dir: &Path, registry: &ModuleRegistry) -> Result<()> {
    for module in registry.all_modules() {
        let deps = registry.direct_dependencies(module.as_str())?;
        let mut source = format!("//! The `{module}` module\n");
        for dep in deps {
            source.push_str(&format!("#[allow(unused_imports)]\nuse crate::{dep}::*;\n"));
        }
        source.push_str(&format!(
            "\n/// Marker for {module}\npub fn {module}_marker() -> &'static str {{\n    \"{module}\"   \n}}\n"
        ));
        source.push_str(&format!(
            "\n#[cfg(test)]\nmod tests {{\n    #[test]\n    fn marker() {{\n        assert_eq!(super::{module}_marker(), \"{module}\");\n    }}\n}}\n"
        ));
        fs::write(dir.join(format!("{module}.rs")), source)?;
    }
    Ok(())
}

fn library() -> Result<(TempDir, Config)> {
    let dir = TempDir::new()?;
    write_library(dir.path(), &ModuleRegistry::builtin()?)?;
    let config = Config {
        src: dir.path().to_path_buf(),
        format: false,
        ..Default::default()
    };
    Ok((dir, config))
}

fn roots(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

#[test]
fn test_closure_and_reexports() -> Result<()> {
    let (_dir, config) = library()?;
    let orchestrator = BundleOrchestrator::new(config)?;
    let bundle = orchestrator.bundle_core(&roots(&["lazysegtree"]))?;

    let names: Vec<&str> = bundle.modules().iter().map(|m| m.as_str()).collect();
    assert_eq!(names, ["internal_bit", "lazysegtree", "segtree"]);

    let text = bundle.text();
    let positions: Vec<usize> = names
        .iter()
        .map(|name| text.find(&format!("pub mod {name} {{")).expect("fragment present"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert!(text.ends_with("use lazysegtree::*;\nuse segtree::*;\n"));
    assert!(!text.contains("use internal_bit::*;"));
    assert!(!text.contains("#[cfg(test)]"));
    assert!(!text.contains("//! The"));
    assert!(!text.contains("/// Marker"));
    assert!(!text.lines().any(|line| line != line.trim_end()));
    Ok(())
}

#[test]
fn test_keep_everything() -> Result<()> {
    let (_dir, mut config) = library()?;
    config.keep_comments = true;
    config.keep_tests = true;
    let bundle = BundleOrchestrator::new(config)?.bundle_core(&roots(&["dsu"]))?;

    assert!(bundle.text().contains("//! The `dsu` module"));
    assert!(bundle.text().contains("#[cfg(test)]"));
    assert!(bundle.text().contains("    \"dsu\"\n"));
    Ok(())
}

#[test]
fn test_root_order_and_duplicates_do_not_change_output() -> Result<()> {
    let (_dir, config) = library()?;
    let orchestrator = BundleOrchestrator::new(config)?;

    let a = orchestrator.bundle_to_string(&roots(&["twosat", "convolution", "maxflow"]))?;
    let b = orchestrator.bundle_to_string(&roots(&["maxflow", "twosat", "convolution", "twosat"]))?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn test_file_and_string_output_are_identical() -> Result<()> {
    let (dir, config) = library()?;
    let orchestrator = BundleOrchestrator::new(config)?;
    let request = roots(&["scc", "math"]);

    let output = dir.path().join("bundle.rs");
    orchestrator.bundle(&request, &output)?;
    assert_eq!(fs::read_to_string(&output)?, orchestrator.bundle_to_string(&request)?);
    Ok(())
}

#[test]
fn test_unknown_module_produces_no_output() -> Result<()> {
    let (dir, config) = library()?;
    let orchestrator = BundleOrchestrator::new(config)?;
    let output = dir.path().join("never.rs");

    let err = orchestrator
        .bundle(&roots(&["dsu", "X"]), &output)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BundleError>(),
        Some(BundleError::UnknownModule(name)) if name == "X"
    ));
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_missing_source_aborts_the_run() -> Result<()> {
    let (dir, config) = library()?;
    fs::remove_file(dir.path().join("internal_scc.rs"))?;
    let orchestrator = BundleOrchestrator::new(config)?;

    let err = orchestrator.bundle_to_string(&roots(&["twosat"])).unwrap_err();
    match err.downcast_ref::<BundleError>() {
        Some(BundleError::SourceUnavailable { module, .. }) => assert_eq!(module, "internal_scc"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("internal_scc"));
    Ok(())
}

#[test]
fn test_custom_table_from_config() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("A.rs"), "pub fn a() {}\n")?;
    fs::write(dir.path().join("B.rs"), "pub fn b() {}\n")?;
    fs::write(dir.path().join("C.rs"), "pub fn c() {}\n")?;

    let table: DependencyTable = [
        ("A".to_owned(), vec![]),
        ("B".to_owned(), vec!["A".to_owned()]),
        ("C".to_owned(), vec!["A".to_owned()]),
    ]
    .into_iter()
    .collect();
    let config = Config {
        src: dir.path().to_path_buf(),
        format: false,
        header: false,
        modules: Some(table),
        ..Default::default()
    };

    let text = BundleOrchestrator::new(config)?.bundle_to_string(&roots(&["C", "B"]))?;
    assert_eq!(
        text,
        "pub mod A {\npub fn a() {}\n}\n\n\
         pub mod B {\npub fn b() {}\n}\n\n\
         pub mod C {\npub fn c() {}\n}\n\n\
         use A::*;\nuse B::*;\nuse C::*;\n"
    );
    Ok(())
}

#[test]
fn test_cyclic_table_is_rejected() {
    let table: DependencyTable = [
        ("A".to_owned(), vec!["B".to_owned()]),
        ("B".to_owned(), vec!["A".to_owned()]),
    ]
    .into_iter()
    .collect();
    let config = Config {
        modules: Some(table),
        ..Default::default()
    };

    let err = BundleOrchestrator::new(config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BundleError>(),
        Some(BundleError::CyclicDependency(members)) if members == &["A", "B"]
    ));
}

#[test]
fn test_broken_formatter_degrades_to_raw_output() -> Result<()> {
    let (dir, mut config) = library()?;
    let raw = BundleOrchestrator::new(config.clone())?.bundle_to_string(&roots(&["string"]))?;

    config.format = true;
    config.rustfmt = Some(dir.path().join("no-such-rustfmt"));
    let orchestrator = BundleOrchestrator::new(config.clone())?;
    assert_eq!(orchestrator.bundle_to_string(&roots(&["string"]))?, raw);

    config.strict_format = true;
    let err = BundleOrchestrator::new(config)?
        .bundle_to_string(&roots(&["string"]))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BundleError>(),
        Some(BundleError::FormattingFailed { .. })
    ));
    Ok(())
}

fn rustfmt_available() -> bool {
    Command::new(locate_rustfmt(None))
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

#[test]
fn test_formatted_bundle_is_a_fixed_point() -> Result<()> {
    if !rustfmt_available() {
        return Ok(());
    }
    let (_dir, mut config) = library()?;
    config.format = true;
    config.strict_format = true;

    let orchestrator = BundleOrchestrator::new(config)?;
    let formatted = orchestrator.bundle_to_string(&roots(&["convolution", "maxflow"]))?;
    let again = ExternalFormatter::rustfmt(locate_rustfmt(None), "2021").format(&formatted)?;
    assert_eq!(formatted, again);
    assert!(formatted.contains("pub mod modint {\n    "));
    Ok(())
}
