//! Filesystem path → wiki page identifier.
//!
//! ```text
//! <root>/<namespace token>/<folders…>/<stem><long extension>
//! ```
//!
//! - The namespace token is mapped through the namespace table. `Main` and any
//!   token mapped to `""` produce no prefix; everything else becomes `<ns>:`.
//! - A file named after its own folder (`Widget/Widget.lua`) collapses one
//!   folder level.
//! - `.doc.wikitext` files get a `/doc` subpage suffix; `.css` and `.js`
//!   files keep their extension in the page name.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use crate::error::CoreError;

/// Folder name → remote namespace prefix.
pub type NamespaceMap = BTreeMap<String, String>;

/// Namespace token that maps to the unprefixed main namespace by default.
pub const MAIN_NAMESPACE: &str = "Main";

/// Long extension of documentation subpages.
pub const DOC_EXTENSION: &str = ".doc.wikitext";

/// Short extensions that stay visible in the page identifier.
const VISIBLE_EXTENSIONS: &[&str] = &[".css", ".js"];

/// Result of resolving one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub target_id: String,
    /// File name with the long extension removed.
    pub stem: String,
    pub short_extension: String,
    pub long_extension: String,
}

impl ResolvedPath {
    /// An empty stem (e.g. `.gitignore`, or a file sitting directly in the
    /// root) cannot name a page. Callers skip such files.
    pub fn is_resolvable(&self) -> bool {
        !self.stem.is_empty()
    }
}

/// Resolve `file` (somewhere below `root`) to a page identifier.
pub fn resolve(
    file: &Path,
    root: &Path,
    namespaces: &NamespaceMap,
) -> Result<ResolvedPath, CoreError> {
    let relative = file.strip_prefix(root).map_err(|_| CoreError::OutsideRoot {
        path: file.to_path_buf(),
        root: root.to_path_buf(),
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            let segment = segment.to_str().ok_or_else(|| CoreError::NonUtf8Path {
                path: file.to_path_buf(),
            })?;
            segments.push(segment);
        }
    }

    Ok(resolve_relative(&segments.join("/"), namespaces))
}

/// Resolve a `/`-separated path relative to the source root.
pub fn resolve_relative(relative: &str, namespaces: &NamespaceMap) -> ResolvedPath {
    let (token, body) = relative.split_once('/').unwrap_or((relative, ""));
    let prefix = namespace_prefix(token, namespaces);

    let mut folder_path = dirname(body);
    let file_name = basename(body);

    let long_extension = long_extension(file_name);
    let short_extension = short_extension(file_name);
    let stem = &file_name[..file_name.len() - long_extension.len()];

    // Widget/Widget.lua -> Widget
    if stem == basename(folder_path) {
        folder_path = dirname(folder_path);
    }

    let mut target_id = prefix;
    if folder_path != "." {
        target_id.push_str(folder_path);
        target_id.push('/');
    }
    target_id.push_str(stem);

    if long_extension == DOC_EXTENSION {
        target_id.push_str("/doc");
    }
    if VISIBLE_EXTENSIONS.contains(&short_extension) {
        target_id.push_str(short_extension);
    }

    ResolvedPath {
        target_id,
        stem: stem.to_string(),
        short_extension: short_extension.to_string(),
        long_extension: long_extension.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn namespace_prefix(token: &str, namespaces: &NamespaceMap) -> String {
    let mapped = match namespaces.get(token) {
        Some(mapped) => mapped.as_str(),
        None if token == MAIN_NAMESPACE => "",
        None => token,
    };
    if mapped.is_empty() {
        String::new()
    } else {
        format!("{mapped}:")
    }
}

/// Parent of a `/`-separated path, `"."` when there is none.
fn dirname(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent,
        _ => ".",
    }
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Everything from the first `.`.
fn long_extension(file_name: &str) -> &str {
    file_name.find('.').map_or("", |i| &file_name[i..])
}

/// Everything from the last `.`, except for dot-files like `.gitignore`.
fn short_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(i) => &file_name[i..],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
