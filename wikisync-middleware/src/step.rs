//! Pipeline steps: match predicates, settings lookup key and the middleware
//! that does the work.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use wikisync_core::ContentUnit;

use crate::error::{BuildError, StepError};

/// Settings handed to a step. Any JSON/YAML value.
pub type Settings = serde_json::Value;

/// Settings keyed by a step's `settings_index`.
pub type SettingsTable = BTreeMap<String, Settings>;

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Predicate over one string attribute of a unit.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Substring test.
    Literal(String),
    /// Regular-expression search.
    Pattern(Regex),
}

impl Matcher {
    pub fn literal(text: impl Into<String>) -> Self {
        Matcher::Literal(text.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, BuildError> {
        compile(pattern).map(Matcher::Pattern)
    }

    pub fn is_match(&self, subject: &str) -> bool {
        match self {
            Matcher::Literal(text) => subject.contains(text.as_str()),
            Matcher::Pattern(re) => re.is_match(subject),
        }
    }
}

pub(crate) fn compile(pattern: &str) -> Result<Regex, BuildError> {
    Regex::new(pattern).map_err(|source| BuildError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Which unit field each predicate is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Short-extension, long-extension and target predicates each test their
    /// own field.
    #[default]
    Field,
    /// Every predicate tests the long extension. Compatibility with project
    /// files written against the older matcher.
    LegacyLongExtension,
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// The transform or validation a step performs.
pub trait Middleware: Send + Sync {
    fn execute(&self, unit: &mut ContentUnit, settings: Option<&Settings>)
        -> Result<(), StepError>;
}

struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut ContentUnit, Option<&Settings>) -> Result<(), StepError> + Send + Sync,
{
    fn execute(
        &self,
        unit: &mut ContentUnit,
        settings: Option<&Settings>,
    ) -> Result<(), StepError> {
        (self.0)(unit, settings)
    }
}

// ---------------------------------------------------------------------------
// PipelineStep
// ---------------------------------------------------------------------------

/// One configured step. Read-only during a run.
#[derive(Clone)]
pub struct PipelineStep {
    pub name: String,
    pub match_short_extension: Option<Matcher>,
    pub match_long_extension: Option<Matcher>,
    pub match_target: Option<Matcher>,
    /// Key into the run's [`SettingsTable`].
    pub settings_index: Option<String>,
    middleware: Arc<dyn Middleware>,
}

impl PipelineStep {
    /// A step that runs on every unit.
    pub fn new(name: impl Into<String>, middleware: impl Middleware + 'static) -> Self {
        Self {
            name: name.into(),
            match_short_extension: None,
            match_long_extension: None,
            match_target: None,
            settings_index: None,
            middleware: Arc::new(middleware),
        }
    }

    /// A step backed by a closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ContentUnit, Option<&Settings>) -> Result<(), StepError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, FnMiddleware(f))
    }

    pub fn when_short_extension(mut self, matcher: Matcher) -> Self {
        self.match_short_extension = Some(matcher);
        self
    }

    pub fn when_long_extension(mut self, matcher: Matcher) -> Self {
        self.match_long_extension = Some(matcher);
        self
    }

    pub fn when_target(mut self, matcher: Matcher) -> Self {
        self.match_target = Some(matcher);
        self
    }

    pub fn with_settings(mut self, index: impl Into<String>) -> Self {
        self.settings_index = Some(index.into());
        self
    }

    /// `true` when every declared predicate matches. No predicates: always.
    pub fn applies_to(&self, unit: &ContentUnit, mode: MatchMode) -> bool {
        let (short_subject, target_subject) = match mode {
            MatchMode::Field => (unit.short_extension(), unit.target_id.as_str()),
            MatchMode::LegacyLongExtension => (unit.long_extension(), unit.long_extension()),
        };
        let checks = [
            (&self.match_long_extension, unit.long_extension()),
            (&self.match_short_extension, short_subject),
            (&self.match_target, target_subject),
        ];
        checks
            .iter()
            .all(|(matcher, subject)| matcher.as_ref().map_or(true, |m| m.is_match(subject)))
    }

    pub fn execute(
        &self,
        unit: &mut ContentUnit,
        settings: Option<&Settings>,
    ) -> Result<(), StepError> {
        self.middleware.execute(unit, settings)
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("match_short_extension", &self.match_short_extension)
            .field("match_long_extension", &self.match_long_extension)
            .field("match_target", &self.match_target)
            .field("settings_index", &self.settings_index)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
