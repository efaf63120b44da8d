pub mod build;
pub mod check;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use wikisync_core::ContentUnit;
use wikisync_sync::RunConfiguration;

/// Make `source_dir` absolute so file arguments given relative to the
/// working directory resolve against it.
pub fn canonical_source(config: &mut RunConfiguration) -> Result<()> {
    config.source_dir = std::fs::canonicalize(&config.source_dir).with_context(|| {
        format!(
            "source directory {} does not exist",
            config.source_dir.display()
        )
    })?;
    Ok(())
}

/// Find a file argument: relative to the working directory first, then
/// relative to the (already canonical) source directory.
pub fn canonical_file(config: &RunConfiguration, file: &Path) -> Result<PathBuf> {
    if file.exists() {
        return std::fs::canonicalize(file)
            .with_context(|| format!("cannot read {}", file.display()));
    }
    let in_source = config.source_dir.join(file);
    std::fs::canonicalize(&in_source).with_context(|| {
        format!(
            "cannot find {} in the working directory or in {}",
            file.display(),
            config.source_dir.display()
        )
    })
}

/// Print a unit's middleware failures, one line each.
pub fn print_unit_errors(unit: &ContentUnit) {
    println!(
        "{} {} ({})",
        "✗".red(),
        unit.target_id.bold(),
        unit.original_path().display()
    );
    for error in unit.errors() {
        println!("    {} {}", error.step.yellow(), error.message);
    }
}
