//! Declarative steps, as written in a project file.
//!
//! ```yaml
//! steps:
//!   - name: module header
//!     match_long_extension: ".lua"
//!     match_target: { pattern: "^Module:" }
//!     settings: header
//!     action: prepend
//! ```
//!
//! A bare string matcher is a substring test; `{ pattern: ... }` is a regex.

use regex::Regex;
use serde::Deserialize;

use wikisync_core::ContentUnit;

use crate::error::{BuildError, StepError};
use crate::step::{compile, Matcher, Middleware, PipelineStep, Settings};
use crate::template;

// ---------------------------------------------------------------------------
// Project-file shapes
// ---------------------------------------------------------------------------

/// A matcher as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MatcherSpec {
    Literal(String),
    Pattern { pattern: String },
}

impl MatcherSpec {
    pub fn build(&self) -> Result<Matcher, BuildError> {
        match self {
            MatcherSpec::Literal(text) => Ok(Matcher::literal(text.clone())),
            MatcherSpec::Pattern { pattern } => Matcher::pattern(pattern),
        }
    }
}

/// What a declarative step does.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Put `text` (or `settings.text`) in front of the content.
    Prepend {
        #[serde(default)]
        text: Option<String>,
    },
    /// Put `text` (or `settings.text`) after the content.
    Append {
        #[serde(default)]
        text: Option<String>,
    },
    /// Regex replace over the content; `with` may use `$1`-style groups.
    Replace { pattern: String, with: String },
    /// Render the content as a Tera template.
    Template,
    /// Set the edit summary to `message` (or `settings.message`).
    Comment {
        #[serde(default)]
        message: Option<String>,
    },
    /// Regex replace over the target identifier.
    Retarget { pattern: String, with: String },
    /// Keep the unit out of the write phase.
    Exclude,
    /// Fail unless the content matches `pattern`.
    Require {
        pattern: String,
        #[serde(default)]
        message: Option<String>,
    },
}

/// A full declarative step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub match_short_extension: Option<MatcherSpec>,
    #[serde(default)]
    pub match_long_extension: Option<MatcherSpec>,
    #[serde(default)]
    pub match_target: Option<MatcherSpec>,
    /// Settings index.
    #[serde(default)]
    pub settings: Option<String>,
    #[serde(flatten)]
    pub action: ActionSpec,
}

impl StepSpec {
    /// Compile patterns and produce a runnable step.
    pub fn build(&self) -> Result<PipelineStep, BuildError> {
        let action = BuiltinAction::from_spec(&self.action)?;
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| action.kind().to_string());

        let mut step = PipelineStep::new(name, action);
        step.match_short_extension = build_matcher(&self.match_short_extension)?;
        step.match_long_extension = build_matcher(&self.match_long_extension)?;
        step.match_target = build_matcher(&self.match_target)?;
        step.settings_index = self.settings.clone();
        Ok(step)
    }
}

fn build_matcher(spec: &Option<MatcherSpec>) -> Result<Option<Matcher>, BuildError> {
    spec.as_ref().map(MatcherSpec::build).transpose()
}

// ---------------------------------------------------------------------------
// Compiled actions
// ---------------------------------------------------------------------------

/// [`ActionSpec`] with its patterns compiled.
#[derive(Debug, Clone)]
pub enum BuiltinAction {
    Prepend(Option<String>),
    Append(Option<String>),
    Replace { re: Regex, with: String },
    Template,
    Comment(Option<String>),
    Retarget { re: Regex, with: String },
    Exclude,
    Require { re: Regex, message: Option<String> },
}

impl BuiltinAction {
    pub fn from_spec(spec: &ActionSpec) -> Result<Self, BuildError> {
        Ok(match spec {
            ActionSpec::Prepend { text } => BuiltinAction::Prepend(text.clone()),
            ActionSpec::Append { text } => BuiltinAction::Append(text.clone()),
            ActionSpec::Replace { pattern, with } => BuiltinAction::Replace {
                re: compile(pattern)?,
                with: with.clone(),
            },
            ActionSpec::Template => BuiltinAction::Template,
            ActionSpec::Comment { message } => BuiltinAction::Comment(message.clone()),
            ActionSpec::Retarget { pattern, with } => BuiltinAction::Retarget {
                re: compile(pattern)?,
                with: with.clone(),
            },
            ActionSpec::Exclude => BuiltinAction::Exclude,
            ActionSpec::Require { pattern, message } => BuiltinAction::Require {
                re: compile(pattern)?,
                message: message.clone(),
            },
        })
    }

    /// Action name, used as the default step name.
    pub fn kind(&self) -> &'static str {
        match self {
            BuiltinAction::Prepend(_) => "prepend",
            BuiltinAction::Append(_) => "append",
            BuiltinAction::Replace { .. } => "replace",
            BuiltinAction::Template => "template",
            BuiltinAction::Comment(_) => "comment",
            BuiltinAction::Retarget { .. } => "retarget",
            BuiltinAction::Exclude => "exclude",
            BuiltinAction::Require { .. } => "require",
        }
    }
}

impl Middleware for BuiltinAction {
    fn execute(
        &self,
        unit: &mut ContentUnit,
        settings: Option<&Settings>,
    ) -> Result<(), StepError> {
        match self {
            BuiltinAction::Prepend(text) => {
                let text = inline_or_setting(text, settings, "text")?;
                unit.content.insert_str(0, &text);
            }
            BuiltinAction::Append(text) => {
                let text = inline_or_setting(text, settings, "text")?;
                unit.content.push_str(&text);
            }
            BuiltinAction::Replace { re, with } => {
                unit.content = re.replace_all(&unit.content, with.as_str()).into_owned();
            }
            BuiltinAction::Template => {
                unit.content = template::render(unit, settings)?;
            }
            BuiltinAction::Comment(message) => {
                unit.commit_message = inline_or_setting(message, settings, "message")?;
            }
            BuiltinAction::Retarget { re, with } => {
                unit.target_id = re.replace_all(&unit.target_id, with.as_str()).into_owned();
            }
            BuiltinAction::Exclude => unit.should_persist = false,
            BuiltinAction::Require { re, message } => {
                if !re.is_match(&unit.content) {
                    return Err(StepError::rejected(message.clone().unwrap_or_else(|| {
                        format!("content does not match `{}`", re.as_str())
                    })));
                }
            }
        }
        Ok(())
    }
}

fn inline_or_setting(
    inline: &Option<String>,
    settings: Option<&Settings>,
    key: &str,
) -> Result<String, StepError> {
    if let Some(value) = inline {
        return Ok(value.clone());
    }
    settings
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| StepError::MissingSetting {
            key: key.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
