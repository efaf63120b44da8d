//! Error types for wikisync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Error code the remote service returns when an edited page does not exist.
pub const MISSING_TITLE: &str = "missingtitle";

/// Errors from path resolution and file enumeration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path being read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file handed to the resolver does not live under the source root.
    #[error("{path} is not inside the source root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// A path component is not valid UTF-8 and cannot become a page name.
    #[error("path {path} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

/// Failures reported by a [`RemoteService`](crate::remote::RemoteService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The service answered with an error code (e.g. `missingtitle`,
    /// `articleexists`, `editconflict`).
    #[error("remote API error `{code}`: {info}")]
    Api { code: String, info: String },

    /// Login was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The request never produced an API answer (network, TLS, bad JSON).
    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Build an [`RemoteError::Api`] from a code and human-readable info.
    pub fn api(code: impl Into<String>, info: impl Into<String>) -> Self {
        RemoteError::Api {
            code: code.into(),
            info: info.into(),
        }
    }

    /// The API error code, if this is an API error.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// `true` when an edit failed because the target page does not exist yet.
    pub fn is_missing_title(&self) -> bool {
        self.code() == Some(MISSING_TITLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_title_is_detected_by_code_only() {
        assert!(RemoteError::api("missingtitle", "The page doesn't exist.").is_missing_title());
        assert!(!RemoteError::api("editconflict", "Edit conflict").is_missing_title());
        assert!(!RemoteError::Transport("missingtitle".into()).is_missing_title());
    }

    #[test]
    fn api_error_display_includes_code() {
        let err = RemoteError::api("protectedpage", "This page has been protected");
        assert_eq!(
            err.to_string(),
            "remote API error `protectedpage`: This page has been protected"
        );
    }
}
