//! Error types for wikisync-sync.

use std::path::PathBuf;

use thiserror::Error;

use wikisync_core::{CoreError, RemoteError};
use wikisync_middleware::BuildError;

use crate::scheduler::SchedulerState;

/// Problems with the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The project file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the file path and serde_yaml's line context.
    #[error("failed to parse project file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A declarative step has an invalid pattern.
    #[error("step #{index} is invalid: {source}")]
    InvalidStep {
        index: usize,
        #[source]
        source: BuildError,
    },

    /// `paths.cache_file` points at a directory.
    #[error("cache file {path} is a directory")]
    CacheIsDirectory { path: PathBuf },

    /// Steps or settings were amended while a run was in progress.
    #[error("configuration cannot change while a run is in progress")]
    RunInProgress,
}

/// All errors that can abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// `run` was called before login succeeded, or while already running.
    #[error("cannot start a run while the scheduler is {state}")]
    NotReady { state: SchedulerState },

    #[error("source directory {path} does not exist")]
    SourceMissing { path: PathBuf },

    /// The file name resolves to an empty page identifier.
    #[error("{path} does not resolve to a page identifier")]
    Unresolvable { path: PathBuf },

    #[error("login failed: {0}")]
    Authentication(#[source] RemoteError),

    /// Enumeration or resolution failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (change cache).
    #[error("change cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
