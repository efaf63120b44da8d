//! Project file loading and the in-memory [`RunConfiguration`].
//!
//! The project file is YAML. Paths inside it are resolved against the
//! directory that contains the file, so a project can be run from anywhere.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use wikisync_core::{Credentials, NamespaceMap};
use wikisync_middleware::{MatchMode, PipelineStep, Settings, SettingsTable, StepSpec};

use crate::change_cache::Retention;
use crate::error::ConfigError;

/// Default project file name looked up by the CLI.
pub const DEFAULT_PROJECT_FILE: &str = "wikisync.yaml";

/// Environment variable that overrides `credentials.password`.
pub const PASSWORD_ENV: &str = "WIKISYNC_PASSWORD";

pub const DEFAULT_EDIT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_COMMENT: &str = "Synchronized from source files";

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

/// Top-level shape of `wikisync.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    pub credentials: Credentials,
    pub paths: PathsSection,
    #[serde(default)]
    pub namespace_mappings: NamespaceMap,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub default_comment: Option<String>,
    #[serde(default)]
    pub cache_retention: Retention,
    #[serde(default)]
    pub legacy_extension_matching: bool,
    #[serde(default)]
    pub middleware_settings: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub source_dir: PathBuf,
    pub cache_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_edit_interval_ms")]
    pub edit_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay; doubles per further retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            edit_interval_ms: DEFAULT_EDIT_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

fn default_edit_interval_ms() -> u64 {
    DEFAULT_EDIT_INTERVAL_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

// ---------------------------------------------------------------------------
// RunConfiguration
// ---------------------------------------------------------------------------

/// Everything a run needs, with paths already absolute and steps compiled.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub credentials: Credentials,
    pub source_dir: PathBuf,
    pub cache_file: PathBuf,
    pub namespace_mappings: NamespaceMap,
    pub steps: Vec<PipelineStep>,
    pub settings: SettingsTable,
    /// Stagger between successive write starts.
    pub edit_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub default_comment: String,
    pub match_mode: MatchMode,
    pub retention: Retention,
}

impl RunConfiguration {
    /// A configuration with defaults for everything but the essentials.
    pub fn new(
        credentials: Credentials,
        source_dir: impl Into<PathBuf>,
        cache_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            credentials,
            source_dir: source_dir.into(),
            cache_file: cache_file.into(),
            namespace_mappings: NamespaceMap::new(),
            steps: Vec::new(),
            settings: SettingsTable::new(),
            edit_interval: Duration::from_millis(DEFAULT_EDIT_INTERVAL_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            default_comment: DEFAULT_COMMENT.to_string(),
            match_mode: MatchMode::Field,
            retention: Retention::Merge,
        }
    }

    /// Append steps after the existing ones.
    pub fn add_steps(&mut self, steps: impl IntoIterator<Item = PipelineStep>) {
        self.steps.extend(steps);
    }

    /// Override settings key by key; keys not in `settings` are kept.
    pub fn set_settings(&mut self, settings: SettingsTable) {
        self.settings.extend(settings);
    }
}

/// Read and validate the project file at `path`.
pub fn load_project(path: &Path) -> Result<RunConfiguration, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let project: ProjectFile = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let password = std::env::var(PASSWORD_ENV).ok();
    from_project(project, base, password)
}

/// Build a [`RunConfiguration`] from an already parsed project file.
///
/// `base` is the directory relative paths are joined onto; `password`
/// replaces the file's password when present.
pub fn from_project(
    project: ProjectFile,
    base: &Path,
    password: Option<String>,
) -> Result<RunConfiguration, ConfigError> {
    let source_dir = base.join(&project.paths.source_dir);
    let cache_file = base.join(&project.paths.cache_file);
    if cache_file.is_dir() {
        return Err(ConfigError::CacheIsDirectory { path: cache_file });
    }

    let steps = project
        .steps
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            spec.build()
                .map_err(|source| ConfigError::InvalidStep { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let settings = project
        .middleware_settings
        .into_iter()
        .map(|(key, value)| Ok((key, yaml_to_settings(value)?)))
        .collect::<Result<SettingsTable, ConfigError>>()?;

    let mut credentials = project.credentials;
    if let Some(password) = password {
        credentials.password = password;
    }

    Ok(RunConfiguration {
        credentials,
        source_dir,
        cache_file,
        namespace_mappings: project.namespace_mappings,
        steps,
        settings,
        edit_interval: Duration::from_millis(project.api.edit_interval_ms),
        max_retries: project.api.max_retries,
        retry_backoff: Duration::from_millis(project.api.retry_backoff_ms),
        default_comment: project
            .default_comment
            .unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
        match_mode: if project.legacy_extension_matching {
            MatchMode::LegacyLongExtension
        } else {
            MatchMode::Field
        },
        retention: project.cache_retention,
    })
}

fn yaml_to_settings(value: serde_yaml::Value) -> Result<Settings, ConfigError> {
    serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("middleware_settings"),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
