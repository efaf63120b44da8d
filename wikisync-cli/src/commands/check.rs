//! `wikisync check` — build without writing and report middleware failures.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use wikisync_sync::{build_all, build_file};

use super::{canonical_file, canonical_source, print_unit_errors};
use crate::ProjectArgs;

/// Arguments for `wikisync check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Check a single file instead of the whole source tree.
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let mut config = self.project.load()?;
        canonical_source(&mut config)?;
        let comment = config.default_comment.clone();

        let units = match &self.file {
            Some(file) => {
                let file = canonical_file(&config, file)?;
                vec![build_file(&config, &file, &comment)
                    .with_context(|| format!("failed to build {}", file.display()))?]
            }
            None => build_all(&config, &comment, |_, _| {}).context("failed to build source tree")?,
        };

        let failed: Vec<_> = units.iter().filter(|u| u.has_errors()).collect();
        for unit in &failed {
            print_unit_errors(unit);
        }

        if !failed.is_empty() {
            bail!("{} of {} file(s) failed", failed.len(), units.len());
        }
        if !self.project.quiet {
            println!("{} {} file(s) checked", "✓".green(), units.len());
        }
        Ok(())
    }
}
