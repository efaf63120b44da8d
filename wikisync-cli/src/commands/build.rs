//! `wikisync build` — run one file through the pipeline and print the page.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use wikisync_sync::build_file;

use super::{canonical_file, canonical_source, print_unit_errors};
use crate::ProjectArgs;

/// Arguments for `wikisync build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Source file to build.
    pub file: PathBuf,

    /// Write the built content here instead of stdout.
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

impl BuildArgs {
    pub fn run(self) -> Result<()> {
        let mut config = self.project.load()?;
        canonical_source(&mut config)?;
        let file = canonical_file(&config, &self.file)?;

        let unit = build_file(&config, &file, &config.default_comment)
            .with_context(|| format!("failed to build {}", self.file.display()))?;

        if unit.has_errors() {
            print_unit_errors(&unit);
            bail!("{} failed {} middleware step(s)", unit.target_id, unit.errors().len());
        }

        if !self.project.quiet {
            let note = if unit.should_persist {
                String::new()
            } else {
                " (excluded)".dimmed().to_string()
            };
            eprintln!("{} {}{note}", "→".cyan(), unit.target_id.bold());
        }

        match self.out {
            Some(out) => std::fs::write(&out, &unit.content)
                .with_context(|| format!("failed to write {}", out.display()))?,
            None => print!("{}", unit.content),
        }
        Ok(())
    }
}
