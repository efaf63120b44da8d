//! Error types for wikisync-middleware.

use thiserror::Error;

/// Why a step's `execute` failed. Recorded on the unit, never fatal to a run.
#[derive(Debug, Error)]
pub enum StepError {
    /// Tera template engine error; the cause is in the source chain.
    #[error("template error")]
    Template(#[from] tera::Error),

    /// The step needs a value that neither its own fields nor its settings
    /// provide.
    #[error("missing setting `{key}`")]
    MissingSetting { key: String },

    /// A validation step refused the content.
    #[error("{0}")]
    Rejected(String),

    /// Anything a custom middleware wants to report.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StepError {
    pub fn rejected(message: impl Into<String>) -> Self {
        StepError::Rejected(message.into())
    }

    /// Message including every `source()` in the chain; Tera keeps the
    /// useful part of its errors there.
    pub fn full_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}

/// Errors building steps from their declarative form.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A `{ pattern: ... }` matcher or a regex action did not compile.
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
