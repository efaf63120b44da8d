//! # wikisync-sync
//!
//! Change-gated, paced synchronisation of a source tree to a wiki.
//!
//! Load a [`RunConfiguration`] with [`config::load_project`], wrap it in a
//! [`Scheduler`] together with a [`RemoteService`](wikisync_core::RemoteService),
//! log in, then call [`Scheduler::run`]. [`pipeline::plan`] gives the same
//! answer as a run without touching the remote side.

pub mod change_cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod scheduler;

pub use change_cache::{ChangeCache, Retention};
pub use config::{load_project, RunConfiguration};
pub use dispatch::WriteOutcome;
pub use error::{ConfigError, SyncError};
pub use events::{EventBus, SyncEvent, UnitRef};
pub use pipeline::{build_all, build_file, plan, Candidate, Plan};
pub use scheduler::{RunReport, Scheduler, SchedulerState};
