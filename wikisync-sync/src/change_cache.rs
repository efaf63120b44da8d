//! Change cache — SHA-256 fingerprints of the last content written per page.
//!
//! Stored as a flat JSON object `{ "<target id>": "<hex digest>" }`. Loading
//! never fails: a missing or corrupt file is an empty cache. Saving writes a
//! `.tmp` sibling, syncs it, then renames it over the real file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Target id → fingerprint.
pub type ChangeCache = BTreeMap<String, String>;

/// What happens to entries for pages that were not written this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retention {
    /// Keep every previous entry; overwrite the ones written this run.
    #[default]
    Merge,
    /// Keep only the entries written this run.
    Replace,
}

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

/// SHA-256 hex digest of `content`, byte for byte.
pub fn fingerprint(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(content.as_bytes());
    hex::encode(h.finalize())
}

/// Fingerprint used for change detection: CRLF folded to LF and trailing
/// whitespace dropped, so line-ending noise never triggers a write.
pub fn content_fingerprint(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    fingerprint(normalized.trim_end())
}

/// `true` unless the cache already holds this content's fingerprint.
pub fn should_write(target_id: &str, content: &str, cache: &ChangeCache) -> bool {
    match cache.get(target_id) {
        Some(stored) => *stored != content_fingerprint(content),
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load the cache at `path`, or an empty one if it is missing or unreadable.
pub fn load(path: &Path) -> ChangeCache {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable change cache");
            }
            return ChangeCache::new();
        }
    };
    match serde_json::from_str::<ChangeCache>(&contents) {
        Ok(cache) => cache,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt change cache");
            ChangeCache::new()
        }
    }
}

/// Save `cache` to `path` atomically.
pub fn save(path: &Path, cache: &ChangeCache) -> Result<(), SyncError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let json = serde_json::to_string_pretty(cache)?;
    let tmp = tmp_path(path);
    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(json.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Combine the loaded cache with the fingerprints recorded this run.
pub fn merge(previous: ChangeCache, recorded: ChangeCache, retention: Retention) -> ChangeCache {
    match retention {
        Retention::Replace => recorded,
        Retention::Merge => {
            let mut merged = previous;
            merged.extend(recorded);
            merged
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
