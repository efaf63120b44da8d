//! Domain types shared by every wikisync crate.
//!
//! [`ContentUnit`] is created once per discovered source file, mutated by the
//! middleware pipeline and discarded after the run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::resolver::ResolvedPath;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Account used to log in to the remote wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account or bot-password user name, e.g. `Example@sync`.
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Full URL of the wiki's `api.php`.
    pub api_url: String,
    /// Prefix for the HTTP user agent; identifies where requests originate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

// ---------------------------------------------------------------------------
// UnitError
// ---------------------------------------------------------------------------

/// A pipeline step failure recorded on the unit it happened to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitError {
    /// Name of the step that failed.
    pub step: String,
    pub message: String,
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step `{}` failed: {}", self.step, self.message)
    }
}

impl std::error::Error for UnitError {}

// ---------------------------------------------------------------------------
// ContentUnit
// ---------------------------------------------------------------------------

/// One source file on its way to becoming a wiki page.
///
/// The original path and both extensions are fixed at creation. Target id,
/// content, commit message and the persist flag are free for middleware to
/// change. Errors are append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUnit {
    original_path: PathBuf,
    short_extension: String,
    long_extension: String,
    errors: Vec<UnitError>,

    /// Remote page identifier.
    pub target_id: String,
    /// Page text.
    pub content: String,
    /// Edit summary submitted with the write.
    pub commit_message: String,
    /// Whether the unit takes part in the write phase.
    pub should_persist: bool,
}

impl ContentUnit {
    /// Build a unit from a resolved path, the raw file content and the
    /// run-wide commit message.
    pub fn new(
        original_path: impl Into<PathBuf>,
        resolved: ResolvedPath,
        content: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            original_path: original_path.into(),
            short_extension: resolved.short_extension,
            long_extension: resolved.long_extension,
            errors: Vec::new(),
            target_id: resolved.target_id,
            content: content.into(),
            commit_message: commit_message.into(),
            should_persist: true,
        }
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    /// Conventional extension, from the last `.` (e.g. `.lua`).
    pub fn short_extension(&self) -> &str {
        &self.short_extension
    }

    /// Full extension, from the first `.` (e.g. `.client.lua`).
    pub fn long_extension(&self) -> &str {
        &self.long_extension
    }

    /// Failures recorded by pipeline steps, in the order they happened.
    pub fn errors(&self) -> &[UnitError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Record a step failure. A failed unit is never written.
    pub fn record_error(&mut self, error: UnitError) {
        self.errors.push(error);
        self.should_persist = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
