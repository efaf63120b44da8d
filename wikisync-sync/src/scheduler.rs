//! The sync scheduler: login state machine and the run algorithm.
//!
//! ```text
//! Idle ──login──▶ Authenticating ──ok──▶ Ready ──run──▶ Running ──▶ Ready
//!                        │
//!                        └──err──▶ Failed ──login──▶ Authenticating
//! ```
//!
//! Only one run may be in flight per scheduler; the `Running` state is the
//! guard. Configuration amendments are refused while a run is in progress.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use wikisync_core::RemoteService;
use wikisync_middleware::{PipelineStep, SettingsTable};

use crate::change_cache::{self, content_fingerprint, ChangeCache};
use crate::config::RunConfiguration;
use crate::dispatch::{self, WriteOutcome};
use crate::error::{ConfigError, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::pipeline;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Authenticating,
    Ready,
    Running,
    Failed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Authenticating => "authenticating",
            SchedulerState::Ready => "ready",
            SchedulerState::Running => "running",
            SchedulerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Files that resolved to a page.
    pub discovered: usize,
    /// One per changed candidate, in dispatch order.
    pub outcomes: Vec<WriteOutcome>,
    /// Candidates skipped because the cache already held their content.
    pub unchanged: Vec<String>,
    pub excluded: usize,
    /// Units with a failed middleware step.
    pub failed_units: usize,
    /// Set when the writes went out but the change cache could not be saved.
    /// The next run will offer those pages again.
    pub cache_error: Option<String>,
}

impl RunReport {
    /// Writes that reached the remote service and succeeded.
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn write_failures(&self) -> usize {
        self.outcomes.len() - self.written()
    }

    /// `true` when every unit built, every write succeeded and the cache
    /// was saved.
    pub fn is_clean(&self) -> bool {
        self.failed_units == 0 && self.write_failures() == 0 && self.cache_error.is_none()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler<R> {
    remote: R,
    config: Mutex<RunConfiguration>,
    state: Mutex<SchedulerState>,
    events: EventBus,
}

/// Puts the scheduler back to `Ready` when a run ends, however it ends.
struct RunGuard<'a> {
    state: &'a Mutex<SchedulerState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = SchedulerState::Ready;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R: RemoteService> Scheduler<R> {
    /// A scheduler in the `Idle` state. Call [`login`](Self::login) next.
    pub fn new(config: RunConfiguration, remote: R) -> Self {
        Self {
            remote,
            config: Mutex::new(config),
            state: Mutex::new(SchedulerState::Idle),
            events: EventBus::new(),
        }
    }

    /// [`new`](Self::new) followed by [`login`](Self::login).
    pub async fn init(config: RunConfiguration, remote: R) -> Result<Self, SyncError> {
        let scheduler = Self::new(config, remote);
        scheduler.login().await?;
        Ok(scheduler)
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> RunConfiguration {
        lock(&self.config).clone()
    }

    /// Append steps to the pipeline. Refused while running.
    pub fn add_steps(
        &self,
        steps: impl IntoIterator<Item = PipelineStep>,
    ) -> Result<(), ConfigError> {
        let state = lock(&self.state);
        if *state == SchedulerState::Running {
            return Err(ConfigError::RunInProgress);
        }
        lock(&self.config).add_steps(steps);
        Ok(())
    }

    /// Override middleware settings key by key. Refused while running.
    pub fn set_settings(&self, settings: SettingsTable) -> Result<(), ConfigError> {
        let state = lock(&self.state);
        if *state == SchedulerState::Running {
            return Err(ConfigError::RunInProgress);
        }
        lock(&self.config).set_settings(settings);
        Ok(())
    }

    /// Authenticate against the remote service.
    ///
    /// Allowed from `Idle`, `Ready` and `Failed`. A failure leaves the
    /// scheduler `Failed` and publishes [`SyncEvent::LoginError`].
    pub async fn login(&self) -> Result<(), SyncError> {
        {
            let mut state = lock(&self.state);
            if matches!(*state, SchedulerState::Running | SchedulerState::Authenticating) {
                return Err(SyncError::NotReady { state: *state });
            }
            *state = SchedulerState::Authenticating;
        }

        match self.remote.login().await {
            Ok(()) => {
                *lock(&self.state) = SchedulerState::Ready;
                tracing::info!("logged in");
                self.events.publish(SyncEvent::Ready);
                Ok(())
            }
            Err(error) => {
                *lock(&self.state) = SchedulerState::Failed;
                tracing::warn!(%error, "login failed");
                self.events.publish(SyncEvent::LoginError {
                    error: error.clone(),
                });
                Err(SyncError::Authentication(error))
            }
        }
    }

    /// Run one sync: discover, diff, write, persist.
    ///
    /// `comment` overrides the configured default commit message. Fails with
    /// [`SyncError::NotReady`] unless the scheduler is `Ready`; the state is
    /// untouched in that case. Once writes have been dispatched the run always
    /// returns its report; a cache save failure lands in
    /// [`RunReport::cache_error`].
    pub async fn run(&self, comment: Option<&str>) -> Result<RunReport, SyncError> {
        let _guard = self.begin_run()?;
        let config = self.config();

        if !config.source_dir.is_dir() {
            return Err(SyncError::SourceMissing {
                path: config.source_dir.clone(),
            });
        }
        let comment = comment.unwrap_or(&config.default_comment);
        let started_at = Utc::now();
        self.events.publish(SyncEvent::RunStarted);

        let previous = change_cache::load(&config.cache_file);
        let discovery = pipeline::discover(&config, comment, |unit, error| {
            self.events.publish(SyncEvent::MiddlewareError {
                unit: unit.into(),
                error: error.clone(),
            });
        })?;
        let plan = discovery.diff(&previous);
        tracing::info!(
            discovered = plan.discovered,
            changed = plan.changed.len(),
            unchanged = plan.unchanged.len(),
            "dispatching writes",
        );

        let outcomes =
            dispatch::dispatch(&self.remote, &plan.changed, config.edit_interval, &self.events)
                .await;

        let recorded: ChangeCache = plan
            .changed
            .iter()
            .zip(&outcomes)
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(candidate, _)| {
                (
                    candidate.target_id.clone(),
                    content_fingerprint(&candidate.content),
                )
            })
            .collect();
        let cache = change_cache::merge(previous, recorded, config.retention);
        let cache_error = match change_cache::save(&config.cache_file, &cache) {
            Ok(()) => None,
            Err(error) => {
                tracing::warn!(%error, "change cache not saved");
                Some(error.to_string())
            }
        };

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            discovered: plan.discovered,
            outcomes,
            unchanged: plan.unchanged,
            excluded: plan.excluded,
            failed_units: plan.failed,
            cache_error,
        };
        self.events.publish(SyncEvent::RunEnded);
        Ok(report)
    }

    fn begin_run(&self) -> Result<RunGuard<'_>, SyncError> {
        let mut state = lock(&self.state);
        if *state != SchedulerState::Ready {
            return Err(SyncError::NotReady { state: *state });
        }
        *state = SchedulerState::Running;
        Ok(RunGuard { state: &self.state })
    }
}
