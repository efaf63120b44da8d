//! `wikisync run` — push changed pages to the wiki.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::broadcast::{error::RecvError, Receiver};

use wikisync_mediawiki::{ApiSession, MediaWikiClient};
use wikisync_sync::{plan, Plan, RunReport, Scheduler, SyncEvent, WriteOutcome};

use crate::ProjectArgs;

/// Arguments for `wikisync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Commit message for this run (defaults to the project's).
    #[arg(long, short)]
    pub comment: Option<String>,

    /// Show what would be written without contacting the wiki.
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = self.project.load()?;
        let comment = self
            .comment
            .clone()
            .unwrap_or_else(|| config.default_comment.clone());

        if self.dry_run {
            let plan = plan(&config, &comment).context("dry run failed")?;
            print_plan(&plan, self.project.quiet);
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;

        let quiet = self.project.quiet;
        let report = runtime.block_on(async move {
            let session = ApiSession::new(config.credentials.clone(), config.max_retries)
                .with_retry_backoff(config.retry_backoff);
            let remote = MediaWikiClient::from_session(session);
            let scheduler = Scheduler::new(config, remote);
            let printer = tokio::spawn(print_events(scheduler.subscribe(), quiet));

            let result = async {
                scheduler.login().await.context("login failed")?;
                scheduler.run(Some(&comment)).await.context("sync run failed")
            }
            .await;

            // Closing the channel ends the printer.
            drop(scheduler);
            let _ = printer.await;
            result
        })?;

        print_report(&report, quiet);
        if report.write_failures() > 0 {
            bail!("{} page(s) could not be written", report.write_failures());
        }
        if let Some(error) = &report.cache_error {
            bail!("pages were written but the change cache was not saved: {error}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

async fn print_events(mut rx: Receiver<SyncEvent>, quiet: bool) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return,
        };
        match event {
            SyncEvent::Ready if !quiet => println!("{} logged in", "✓".green()),
            SyncEvent::RunStarted if !quiet => println!("{} building pages…", "→".cyan()),
            SyncEvent::MiddlewareError { unit, error } => eprintln!(
                "{} {} ({}): {error}",
                "✗".red(),
                unit.target_id.bold(),
                unit.original_path.display()
            ),
            SyncEvent::EditError { unit, error } => {
                eprintln!("{} edit {}: {error}", "✗".red(), unit.target_id.bold())
            }
            SyncEvent::CreateError { unit, error } => {
                eprintln!("{} create {}: {error}", "✗".red(), unit.target_id.bold())
            }
            SyncEvent::LoginError { error } => eprintln!("{} login: {error}", "✗".red()),
            _ => {}
        }
    }
}

fn print_report(report: &RunReport, quiet: bool) {
    if quiet {
        return;
    }
    for outcome in &report.outcomes {
        match outcome {
            WriteOutcome::Edited { target_id, .. } => println!("  ✎  {target_id}"),
            WriteOutcome::Created { target_id, .. } => println!("  +  {target_id}"),
            WriteOutcome::NoChange { target_id } => println!("  ·  {target_id}"),
            WriteOutcome::Failed { target_id, .. } => println!("  {}  {target_id}", "✗".red()),
        }
    }
    let elapsed = report.finished_at - report.started_at;
    println!(
        "{} {} written, {} unchanged, {} excluded, {} failed ({}s, finished {})",
        "✓".green(),
        report.written(),
        report.unchanged.len(),
        report.excluded,
        report.failed_units + report.write_failures(),
        elapsed.num_seconds(),
        report
            .finished_at
            .with_timezone(&Local)
            .format("%H:%M:%S")
    );
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "page")]
    page: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "summary")]
    summary: String,
}

fn print_plan(plan: &Plan, quiet: bool) {
    if quiet {
        return;
    }
    if plan.changed.is_empty() {
        println!("[dry-run] {} nothing to write", "✓".green());
    } else {
        let rows: Vec<PlanRow> = plan
            .changed
            .iter()
            .map(|c| PlanRow {
                page: c.target_id.clone(),
                source: c.unit.original_path.display().to_string(),
                summary: c.commit_message.clone(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    println!(
        "[dry-run] {} to write, {} unchanged, {} excluded, {} failed",
        plan.changed.len(),
        plan.unchanged.len(),
        plan.excluded,
        plan.failed
    );
}
