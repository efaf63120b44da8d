//! Recursive source-tree enumeration.

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};

/// Every regular file below `root`, recursively.
///
/// Entries are sorted by path so the order is stable between runs; later
/// files with the same target id replace earlier ones, so this matters.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut out = Vec::new();
    collect_files(root, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CoreError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        // Follows symlinks, like the resolver's view of the tree.
        let meta = std::fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
