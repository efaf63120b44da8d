//! wikisync — push a source tree to a MediaWiki site.
//!
//! # Usage
//!
//! ```text
//! wikisync run   [--project wikisync.yaml] [--comment <msg>] [--dry-run] [--quiet]
//! wikisync build <FILE> [--project wikisync.yaml] [--out <path>] [--quiet]
//! wikisync check [FILE] [--project wikisync.yaml] [--quiet]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use commands::{build::BuildArgs, check::CheckArgs, run::RunArgs};
use wikisync_sync::{config::DEFAULT_PROJECT_FILE, load_project, RunConfiguration};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "wikisync",
    version,
    about = "Synchronize local source files to wiki pages",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build every file and push changed pages to the wiki.
    Run(RunArgs),

    /// Build one file through the pipeline and print the result.
    Build(BuildArgs),

    /// Build files and report middleware failures without writing anything.
    Check(CheckArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Path to the project file.
    #[arg(long, short, default_value = DEFAULT_PROJECT_FILE)]
    pub project: PathBuf,

    /// Only print errors.
    #[arg(long, short)]
    pub quiet: bool,
}

impl ProjectArgs {
    pub fn load(&self) -> Result<RunConfiguration> {
        let config = load_project(&self.project)
            .with_context(|| format!("failed to load project {}", self.project.display()))?;
        tracing::debug!(
            project = %self.project.display(),
            source = %config.source_dir.display(),
            steps = config.steps.len(),
            "project loaded"
        );
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let fallback = if quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            init_tracing(args.project.quiet);
            args.run()
        }
        Commands::Build(args) => {
            init_tracing(args.project.quiet);
            args.run()
        }
        Commands::Check(args) => {
            init_tracing(args.project.quiet);
            args.run()
        }
    }
}
