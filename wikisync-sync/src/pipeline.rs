//! Discovery: enumerate → resolve → build units → middleware → candidates.
//!
//! Everything here is synchronous and remote-free, so the same code backs a
//! real run, the dry-run plan and the offline `build`/`check` commands.

use std::collections::HashMap;
use std::path::Path;

use wikisync_core::{files, resolver, ContentUnit, CoreError, UnitError};
use wikisync_middleware::pipeline as middleware;

use crate::change_cache::{self, ChangeCache};
use crate::config::RunConfiguration;
use crate::error::{io_err, SyncError};
use crate::events::UnitRef;

// ---------------------------------------------------------------------------
// Building units
// ---------------------------------------------------------------------------

/// Resolve and pipe a single file. Middleware failures end up on the unit.
pub fn build_file(
    config: &RunConfiguration,
    path: &Path,
    comment: &str,
) -> Result<ContentUnit, SyncError> {
    build_unit(config, path, comment, &mut |_, _| {})
}

/// Build every file under the source root, in enumeration order.
///
/// Files that do not resolve to a page, or that cannot be read, are skipped
/// with a warning. Only a failure to list the source tree is fatal.
/// `on_error` is called for each failing middleware step.
pub fn build_all<F>(
    config: &RunConfiguration,
    comment: &str,
    mut on_error: F,
) -> Result<Vec<ContentUnit>, SyncError>
where
    F: FnMut(&ContentUnit, &UnitError),
{
    let mut units = Vec::new();
    for path in files::list_files(&config.source_dir)? {
        match build_unit(config, &path, comment, &mut on_error) {
            Ok(unit) => units.push(unit),
            Err(SyncError::Unresolvable { path })
            | Err(SyncError::Core(CoreError::OutsideRoot { path, .. })) => {
                tracing::warn!(path = %path.display(), "skipping file without a page identifier");
            }
            Err(SyncError::Core(CoreError::NonUtf8Path { path })) => {
                tracing::warn!(path = %path.display(), "skipping file with a non UTF-8 name");
            }
            Err(SyncError::Io { path, source }) => {
                tracing::warn!(path = %path.display(), error = %source, "skipping unreadable file");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(units)
}

fn build_unit(
    config: &RunConfiguration,
    path: &Path,
    comment: &str,
    on_error: &mut dyn FnMut(&ContentUnit, &UnitError),
) -> Result<ContentUnit, SyncError> {
    let resolved = resolver::resolve(path, &config.source_dir, &config.namespace_mappings)?;
    if !resolved.is_resolvable() {
        return Err(SyncError::Unresolvable {
            path: path.to_path_buf(),
        });
    }

    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let content = String::from_utf8_lossy(&bytes);
    let mut unit = ContentUnit::new(path, resolved, content, comment);

    middleware::run(
        &mut unit,
        &config.steps,
        &config.settings,
        config.match_mode,
        |unit, error| on_error(unit, error),
    );
    Ok(unit)
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// A unit that survived the pipeline and may be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub unit: UnitRef,
    pub target_id: String,
    pub content: String,
    pub commit_message: String,
}

impl From<ContentUnit> for Candidate {
    fn from(unit: ContentUnit) -> Self {
        Self {
            unit: UnitRef::from(&unit),
            target_id: unit.target_id,
            content: unit.content,
            commit_message: unit.commit_message,
        }
    }
}

/// Result of building every unit, before the cache is consulted.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub discovered: usize,
    /// One per target id, ordered by first appearance.
    pub candidates: Vec<Candidate>,
    /// Units dropped by a step without an error.
    pub excluded: usize,
    /// Units with at least one failed step.
    pub failed: usize,
}

impl Discovery {
    pub fn from_units(units: Vec<ContentUnit>) -> Self {
        let mut discovery = Discovery {
            discovered: units.len(),
            ..Default::default()
        };
        let mut index: HashMap<String, usize> = HashMap::new();

        for unit in units {
            if unit.has_errors() {
                discovery.failed += 1;
                continue;
            }
            if !unit.should_persist {
                discovery.excluded += 1;
                continue;
            }
            let candidate = Candidate::from(unit);
            match index.get(&candidate.target_id) {
                Some(&slot) => {
                    tracing::debug!(page = %candidate.target_id, "later file replaces earlier one");
                    discovery.candidates[slot] = candidate;
                }
                None => {
                    index.insert(candidate.target_id.clone(), discovery.candidates.len());
                    discovery.candidates.push(candidate);
                }
            }
        }
        discovery
    }

    /// Split candidates into changed and unchanged against `cache`.
    pub fn diff(self, cache: &ChangeCache) -> Plan {
        let mut changed = Vec::new();
        let mut unchanged = Vec::new();
        for candidate in self.candidates {
            if change_cache::should_write(&candidate.target_id, &candidate.content, cache) {
                changed.push(candidate);
            } else {
                tracing::debug!(page = %candidate.target_id, "unchanged");
                unchanged.push(candidate.target_id);
            }
        }
        Plan {
            discovered: self.discovered,
            changed,
            unchanged,
            excluded: self.excluded,
            failed: self.failed,
        }
    }
}

/// What a run would write.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub discovered: usize,
    pub changed: Vec<Candidate>,
    pub unchanged: Vec<String>,
    pub excluded: usize,
    pub failed: usize,
}

/// Build every unit and collect the de-duplicated candidates.
pub fn discover<F>(
    config: &RunConfiguration,
    comment: &str,
    on_error: F,
) -> Result<Discovery, SyncError>
where
    F: FnMut(&ContentUnit, &UnitError),
{
    Ok(Discovery::from_units(build_all(config, comment, on_error)?))
}

/// Dry run: discovery plus the cache diff, with no remote call and no
/// cache write.
pub fn plan(config: &RunConfiguration, comment: &str) -> Result<Plan, SyncError> {
    if !config.source_dir.is_dir() {
        return Err(SyncError::SourceMissing {
            path: config.source_dir.clone(),
        });
    }
    let cache = change_cache::load(&config.cache_file);
    Ok(discover(config, comment, |_, _| {})?.diff(&cache))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
